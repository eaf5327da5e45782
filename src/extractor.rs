//! Extraction orchestration: fixed-path descent to the leaf record set, then
//! per-field coordinate extraction and bounded serialization.
//!
//! An [`Extractor`] is immutable after construction. Each call to
//! [`Extractor::extract`] builds its result from scratch, so one extractor
//! can serve any number of requests, concurrently if shared behind an `Arc`.

use std::path::Path;

use serde_json::{Map, Value as Json};

use crate::config::ExtractorConfig;
use crate::coordinate::{self, ExtractionMethod};
use crate::error::{DepsliceResult, RangeError};
use crate::export::{
    CycleListing, ExtractionRequest, ExtractionResult, ExtractionState, FieldData, NavigationStep, ProcessingStats,
    SourceSummary, StructureInfo, TimeInfo, TimeRange, TimeSummary, ValueInfo,
};
use crate::marker::{Marker, MarkerCounts};
use crate::navigate::{navigate, step_into};
use crate::serialize::Serializer;
use crate::source::Source;
use crate::value::Value;

/// Property name used when the leaf reached is not a record.
pub const ARRAY_DATA_FIELD: &str = "array_data";

/// Number of leading timestamps shown in a summary.
const SAMPLE_TIMES: usize = 10;

/// Entity/cycle extractor over one loaded source.
#[derive(Debug, Clone)]
pub struct Extractor {
    source: Source,
    config: ExtractorConfig,
    serializer: Serializer,
    root: Value,
    time_axis: Option<Vec<f64>>,
}

impl Extractor {
    /// Build an extractor over an already loaded source.
    ///
    /// Fails on an invalid configuration or a missing root variable.
    pub fn new(source: Source, config: ExtractorConfig) -> DepsliceResult<Self> {
        config.validate()?;
        let serializer = Serializer::new(config.serializer.clone())?;
        let root = source.root(&config.root_variable)?;
        let time_axis = read_time_axis(&root, &config.time_field);
        match &time_axis {
            Some(axis) => tracing::info!(
                root = %config.root_variable,
                cycles = axis.len(),
                "extractor ready"
            ),
            None => tracing::warn!(
                root = %config.root_variable,
                time_field = %config.time_field,
                "no time axis found; timestamps will be absent"
            ),
        }
        Ok(Self {
            source,
            config,
            serializer,
            root,
            time_axis,
        })
    }

    /// Load a source document from disk and build an extractor over it.
    pub fn open(path: &Path, config: ExtractorConfig) -> DepsliceResult<Self> {
        let source = Source::load(path)?;
        Self::new(source, config)
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// The flattened time axis, if the root record carries one.
    pub fn time_axis(&self) -> Option<&[f64]> {
        self.time_axis.as_deref()
    }

    pub fn total_cycles(&self) -> usize {
        self.time_axis.as_ref().map_or(0, Vec::len)
    }

    /// Extract every leaf field at `request`.
    ///
    /// Never fails: navigation errors end in [`ExtractionState::Failed`] with
    /// empty properties, and per-field failures become markers.
    pub fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        let span = tracing::info_span!(
            "extract",
            entity_id = request.entity_id,
            cycle_number = request.cycle_number
        );
        let _guard = span.enter();

        let mut state = ExtractionState::NotStarted;
        let mut result = ExtractionResult {
            request,
            timestamp: None,
            time: None,
            state: ExtractionState::NotStarted,
            properties: Map::new(),
            extraction_methods: Default::default(),
            field_data: Default::default(),
            errors: Vec::new(),
            structure: StructureInfo {
                root_variable: self.config.root_variable.clone(),
                root: ValueInfo::of(&self.root),
                navigation_path: self.config.navigation_path.clone(),
                navigation: Vec::with_capacity(self.config.navigation_path.len()),
                leaf: None,
            },
            stats: ProcessingStats::default(),
        };
        self.resolve_time(request.cycle_number, &mut result);

        let path = &self.config.navigation_path;
        let mut leaf = self.root.clone();
        for (step, segment) in path.iter().enumerate() {
            state.advance(ExtractionState::NavigatingPath { step });
            match step_into(&leaf, path, step) {
                Ok(value) => {
                    result.structure.navigation.push(NavigationStep {
                        step,
                        segment: segment.clone(),
                        success: true,
                        reached: Some(ValueInfo::of(&value)),
                    });
                    leaf = value;
                }
                Err(e) => {
                    tracing::warn!(step, segment = e.segment(), error = %e, "navigation failed");
                    result.structure.navigation.push(NavigationStep {
                        step,
                        segment: segment.clone(),
                        success: false,
                        reached: None,
                    });
                    result.errors.push(format!("navigation failed: {e}"));
                    state.advance(ExtractionState::Failed {
                        step: e.step(),
                        segment: e.segment().to_string(),
                    });
                    result.state = state;
                    return result;
                }
            }
        }
        state.advance(ExtractionState::LeafReached);
        result.structure.leaf = Some(ValueInfo::of(&leaf));

        state.advance(ExtractionState::PerFieldExtraction);
        match &leaf {
            Value::Record(rec) => {
                for (name, value) in rec.fields() {
                    self.extract_field(name, value, request, &mut result);
                }
            }
            other => self.extract_field(ARRAY_DATA_FIELD, other, request, &mut result),
        }

        state.advance(ExtractionState::Done);
        result.state = state;
        tracing::info!(
            fields = result.properties.len(),
            errors = result.errors.len(),
            "extraction complete"
        );
        result
    }

    fn extract_field(&self, name: &str, value: &Value, request: ExtractionRequest, result: &mut ExtractionResult) {
        // the field's own failure marker is counted through its method
        let field = match self.field_value(value, request) {
            Ok(done) => done,
            Err(FieldFailure::Range(e)) => {
                result.errors.push(format!("{name}: {e}"));
                FieldOutput::failed(ExtractionMethod::OutOfRange, out_of_range_marker(&e))
            }
            Err(FieldFailure::Access(message)) => {
                result.errors.push(format!("{name}: {message}"));
                let marker = Marker::FieldExtractionError {
                    error: message,
                    field_name: name.to_string(),
                };
                FieldOutput::failed(ExtractionMethod::Error, marker.to_json())
            }
        };
        tracing::debug!(field = name, method = %field.method, "field extracted");
        result.stats.record_field(field.method, field.markers);
        result.extraction_methods.insert(name, field.method);
        result.field_data.insert(name, field.data);
        result.properties.insert(name.to_string(), field.json);
    }

    fn field_value(&self, value: &Value, request: ExtractionRequest) -> Result<FieldOutput, FieldFailure> {
        let value = value.resolve().map_err(|e| FieldFailure::Access(e.to_string()))?;
        let extracted =
            coordinate::extract(&value, request.entity_id, request.cycle_number).map_err(FieldFailure::Range)?;
        tracing::trace!(indices = ?extracted.indices, "coordinates applied");
        let (json, markers) = self
            .serializer
            .serialize_counted(&extracted.value)
            .map_err(|e| FieldFailure::Access(e.to_string()))?;
        Ok(FieldOutput {
            method: extracted.method,
            json,
            markers,
            data: FieldData::of(&extracted.value),
        })
    }

    fn resolve_time(&self, cycle: usize, result: &mut ExtractionResult) {
        let Some(axis) = self.time_axis.as_deref() else {
            return;
        };
        let Some(&timestamp) = axis.get(cycle) else {
            tracing::debug!(cycle, total = axis.len(), "cycle beyond time axis");
            return;
        };
        result.timestamp = Some(timestamp);
        result.time = Some(TimeInfo {
            cycle_timestamp: timestamp,
            total_cycles: axis.len(),
            cycle_index: cycle,
            time_range: TimeRange::of(axis),
        });
    }

    /// Variable names, time axis overview and root structure.
    pub fn summary(&self) -> SourceSummary {
        let time_info = self.time_axis.as_deref().map(|axis| TimeSummary {
            total_cycles: axis.len(),
            time_range: TimeRange::of(axis),
            sample_times: axis.iter().take(SAMPLE_TIMES).copied().collect(),
        });
        SourceSummary {
            origin: self.source.origin().to_string(),
            total_variables: self.source.variable_names().len(),
            variables: self.source.variable_names().into_iter().map(str::to_string).collect(),
            root_variable: self.config.root_variable.clone(),
            time_info,
            root: ValueInfo::of(&self.root),
        }
    }

    /// Every valid cycle index.
    pub fn available_cycles(&self) -> CycleListing {
        CycleListing::new(self.total_cycles())
    }
}

enum FieldFailure {
    Range(RangeError),
    Access(String),
}

struct FieldOutput {
    method: ExtractionMethod,
    json: Json,
    markers: MarkerCounts,
    data: FieldData,
}

impl FieldOutput {
    fn failed(method: ExtractionMethod, json: Json) -> Self {
        Self {
            method,
            json,
            markers: MarkerCounts::default(),
            data: FieldData::default(),
        }
    }
}

fn out_of_range_marker(e: &RangeError) -> Json {
    let marker = match e {
        RangeError::Cycle {
            requested_cycle,
            max_cycle,
            field_shape,
        } => Marker::IndexOutOfRange {
            requested_cycle: *requested_cycle,
            max_cycle: Some(*max_cycle),
            field_shape: field_shape.clone(),
        },
        RangeError::EmptyTimeAxis {
            requested_cycle,
            field_shape,
        } => Marker::IndexOutOfRange {
            requested_cycle: *requested_cycle,
            max_cycle: None,
            field_shape: field_shape.clone(),
        },
    };
    marker.to_json()
}

/// The root's time field flattened to `f64`, if present and numeric.
fn read_time_axis(root: &Value, field: &str) -> Option<Vec<f64>> {
    match navigate(root, &[field]) {
        Ok(Value::Array(arr)) => Some(arr.to_f64_vec()),
        Ok(Value::Scalar(s)) => Some(vec![s.as_f64()]),
        Ok(other) => {
            tracing::debug!(field, kind = other.type_name(), "time field is not numeric");
            None
        }
        Err(_) => None,
    }
}
