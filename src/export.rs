//! Export types for the documents the extractor emits.
//!
//! Everything here is plain data with `Serialize`: the extractor builds a
//! fresh document per call and hands ownership to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as Json};

use crate::classify::classify;
use crate::coordinate::ExtractionMethod;
use crate::marker::MarkerCounts;
use crate::value::Value;

/// An entity/cycle pair to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Position on the entity axis (axis 0).
    pub entity_id: usize,
    /// Position on the time axis (last axis), not a timestamp.
    pub cycle_number: usize,
}

impl ExtractionRequest {
    pub fn new(entity_id: usize, cycle_number: usize) -> Self {
        Self {
            entity_id,
            cycle_number,
        }
    }
}

/// Orchestrator progress. Only `Done` and `Failed` are ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionState {
    NotStarted,
    NavigatingPath { step: usize },
    LeafReached,
    PerFieldExtraction,
    Done,
    /// Navigation stopped before the leaf record set.
    Failed { step: usize, segment: String },
}

impl ExtractionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionState::Done | ExtractionState::Failed { .. })
    }

    /// Move to `next`, logging the transition.
    pub(crate) fn advance(&mut self, next: ExtractionState) {
        tracing::debug!(from = ?self, to = ?next, "extraction state");
        *self = next;
    }
}

/// Start and end of the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// First and last sample, or `None` for an empty axis.
    pub fn of(axis: &[f64]) -> Option<Self> {
        Some(Self {
            start: *axis.first()?,
            end: *axis.last()?,
        })
    }
}

/// Where the requested cycle sits on the time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeInfo {
    pub cycle_timestamp: f64,
    pub total_cycles: usize,
    pub cycle_index: usize,
    pub time_range: Option<TimeRange>,
}

/// Kind, shape and field names of one value in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInfo {
    pub kind: &'static str,
    pub shape: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl ValueInfo {
    pub fn of(value: &Value) -> Self {
        let resolved = value.resolve().unwrap_or_else(|_| value.clone());
        let fields = match &resolved {
            Value::Record(rec) => rec.field_names().to_vec(),
            Value::Map(entries) => entries.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        };
        Self {
            kind: classify(&resolved).name(),
            shape: resolved.shape(),
            fields,
        }
    }
}

/// One step of the fixed navigation path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationStep {
    pub step: usize,
    pub segment: String,
    pub success: bool,
    /// What the step reached; `None` when it failed.
    pub reached: Option<ValueInfo>,
}

/// Shape of the tree the request walked through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureInfo {
    pub root_variable: String,
    pub root: ValueInfo,
    pub navigation_path: Vec<String>,
    /// Steps attempted, in order; the last one failed if navigation did.
    pub navigation: Vec<NavigationStep>,
    /// `None` when navigation failed before the leaf.
    pub leaf: Option<ValueInfo>,
}

/// Entries keyed by field name, kept in insertion order and serialized as a
/// JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap<T>(Vec<(String, T)>);

impl<T> Default for FieldMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FieldMap<T> {
    /// Insert or replace the entry for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Serialize> Serialize for FieldMap<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// Shape and size of the value extracted for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldData {
    pub data_shape: Option<Vec<usize>>,
    pub data_size: Option<usize>,
}

impl FieldData {
    pub fn of(value: &Value) -> Self {
        Self {
            data_shape: value.shape(),
            data_size: value.size(),
        }
    }
}

/// Per-request tallies, accumulated as fields are extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub fields_processed: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
    pub field_errors: usize,
    pub out_of_range: usize,
    pub circular_references: usize,
    pub max_depth_exceeded: usize,
    pub conversion_errors: usize,
    /// Fields per extraction method.
    pub methods: BTreeMap<ExtractionMethod, usize>,
}

impl ProcessingStats {
    /// Account for one field and the markers its serialization emitted.
    pub fn record_field(&mut self, method: ExtractionMethod, markers: MarkerCounts) {
        self.fields_processed += 1;
        match method {
            ExtractionMethod::OutOfRange => {
                self.out_of_range += 1;
                self.failed_extractions += 1;
            }
            ExtractionMethod::Error => {
                self.field_errors += 1;
                self.failed_extractions += 1;
            }
            _ => self.successful_extractions += 1,
        }
        *self.methods.entry(method).or_default() += 1;
        self.field_errors += markers.field_errors;
        self.circular_references += markers.circular_references;
        self.max_depth_exceeded += markers.max_depth_exceeded;
        self.conversion_errors += markers.conversion_errors;
    }
}

/// The document returned for one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub request: ExtractionRequest,
    /// Time-axis value at the requested cycle; `None` when absent or out of range.
    pub timestamp: Option<f64>,
    pub time: Option<TimeInfo>,
    pub state: ExtractionState,
    /// Field name to serialized value or marker, in leaf field order.
    pub properties: Map<String, Json>,
    pub extraction_methods: FieldMap<ExtractionMethod>,
    /// Shape and size of each extracted value, in the same order.
    pub field_data: FieldMap<FieldData>,
    pub errors: Vec<String>,
    pub structure: StructureInfo,
    pub stats: ProcessingStats,
}

impl ExtractionResult {
    pub fn property(&self, name: &str) -> Option<&Json> {
        self.properties.get(name)
    }

    pub fn method(&self, name: &str) -> Option<ExtractionMethod> {
        self.extraction_methods.get(name).copied()
    }

    pub fn is_done(&self) -> bool {
        self.state == ExtractionState::Done
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

/// Time axis overview for [`SourceSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSummary {
    pub total_cycles: usize,
    pub time_range: Option<TimeRange>,
    /// The first few timestamps.
    pub sample_times: Vec<f64>,
}

/// Overview of a loaded source without extracting anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub origin: String,
    pub total_variables: usize,
    pub variables: Vec<String>,
    pub root_variable: String,
    pub time_info: Option<TimeSummary>,
    pub root: ValueInfo,
}

/// Valid cycle indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleListing {
    pub available_cycles: Vec<usize>,
    pub total_cycles: usize,
    pub cycle_range: String,
}

impl CycleListing {
    pub fn new(total_cycles: usize) -> Self {
        let cycle_range = match total_cycles {
            0 => "No cycles available".to_string(),
            n => format!("0 to {}", n - 1),
        };
        Self {
            available_cycles: (0..total_cycles).collect(),
            total_cycles,
            cycle_range,
        }
    }
}
