//! Typed markers embedded in serialized output.
//!
//! Every failure or summarization decision that is scoped to one position in
//! the tree is written as a JSON object with a `"type"` tag at that position,
//! so a single bad value never aborts its siblings.

use serde::Serialize;
use serde_json::{Value as Json, json};

use crate::value::ElementKind;

/// Summary statistics over every element of a large array.
///
/// Non-finite results are emitted as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

/// Shape and element type of one field of a record collection, read from
/// its first instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub shape: Option<Vec<usize>>,
    pub dtype: String,
    pub size: Option<usize>,
}

/// A position-scoped marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marker {
    /// Recursion stopped at the configured depth limit.
    MaxDepthExceeded {
        current_depth: usize,
        max_depth: usize,
        object_type: String,
    },
    /// The value is an ancestor currently being expanded.
    CircularReference { object_type: String, depth: usize },
    /// The value could not be represented as a JSON primitive.
    ConversionError {
        error: String,
        object_type: String,
        depth: usize,
    },
    /// A record collection: metadata only.
    StructuredArray {
        shape: Vec<usize>,
        dtype: String,
        fields: Vec<String>,
        field_info: Vec<FieldInfo>,
        size: usize,
    },
    /// An array too large to embed: metadata plus leading sample.
    LargeArray {
        shape: Vec<usize>,
        dtype: ElementKind,
        size: usize,
        sample_values: Vec<Json>,
        #[serde(skip_serializing_if = "Option::is_none")]
        statistics: Option<Statistics>,
    },
    /// An array too large even to sample: metadata only.
    OversizedArray {
        shape: Vec<usize>,
        dtype: ElementKind,
        size: usize,
    },
    /// Requested cycle lies beyond the field's time axis.
    IndexOutOfRange {
        requested_cycle: usize,
        max_cycle: Option<usize>,
        field_shape: Vec<usize>,
    },
    /// Reading one field failed.
    FieldExtractionError { error: String, field_name: String },
}

impl Marker {
    /// The `"type"` tag this marker serializes with.
    pub fn tag(&self) -> &'static str {
        match self {
            Marker::MaxDepthExceeded { .. } => "max_depth_exceeded",
            Marker::CircularReference { .. } => "circular_reference",
            Marker::ConversionError { .. } => "conversion_error",
            Marker::StructuredArray { .. } => "structured_array",
            Marker::LargeArray { .. } => "large_array",
            Marker::OversizedArray { .. } => "oversized_array",
            Marker::IndexOutOfRange { .. } => "index_out_of_range",
            Marker::FieldExtractionError { .. } => "field_extraction_error",
        }
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Json {
        // Every field is a plain number, string or list; this cannot fail.
        serde_json::to_value(self).unwrap_or_else(|e| {
            json!({ "type": "conversion_error", "error": e.to_string(), "object_type": self.tag(), "depth": 0 })
        })
    }
}

/// Failure markers emitted by one serialization call, counted as they are
/// created rather than by scanning the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkerCounts {
    pub circular_references: usize,
    pub max_depth_exceeded: usize,
    pub conversion_errors: usize,
    pub field_errors: usize,
}

impl MarkerCounts {
    /// Count `marker` and render it.
    pub fn emit(&mut self, marker: Marker) -> Json {
        match marker {
            Marker::CircularReference { .. } => self.circular_references += 1,
            Marker::MaxDepthExceeded { .. } => self.max_depth_exceeded += 1,
            Marker::ConversionError { .. } => self.conversion_errors += 1,
            Marker::FieldExtractionError { .. } => self.field_errors += 1,
            _ => {}
        }
        marker.to_json()
    }

    pub fn total(&self) -> usize {
        self.circular_references + self.max_depth_exceeded + self.conversion_errors + self.field_errors
    }
}

/// Marker tag of a JSON object, if it carries one.
pub fn tag_of(value: &Json) -> Option<&str> {
    value.as_object()?.get("type")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_serialize_with_type_tag() {
        let m = Marker::CircularReference {
            object_type: "record".into(),
            depth: 3,
        };
        let v = m.to_json();
        assert_eq!(v["type"], "circular_reference");
        assert_eq!(v["depth"], 3);
        assert_eq!(tag_of(&v), Some(m.tag()));
    }

    #[test]
    fn out_of_range_marker_carries_max_cycle() {
        let v = Marker::IndexOutOfRange {
            requested_cycle: 500,
            max_cycle: Some(199),
            field_shape: vec![4, 200],
        }
        .to_json();
        assert_eq!(v["max_cycle"], 199);
        assert_eq!(v["field_shape"], json!([4, 200]));
    }

    #[test]
    fn statistics_omitted_when_absent() {
        let v = Marker::LargeArray {
            shape: vec![500],
            dtype: ElementKind::Float64,
            size: 500,
            sample_values: vec![],
            statistics: None,
        }
        .to_json();
        assert_eq!(v["dtype"], "float64");
        assert!(v.get("statistics").is_none());
    }

    #[test]
    fn counts_track_failure_markers_only() {
        let mut counts = MarkerCounts::default();
        let v = counts.emit(Marker::CircularReference {
            object_type: "record".into(),
            depth: 1,
        });
        assert_eq!(v["type"], "circular_reference");
        counts.emit(Marker::OversizedArray {
            shape: vec![10],
            dtype: ElementKind::Int64,
            size: 10,
        });
        counts.emit(Marker::FieldExtractionError {
            error: "gone".into(),
            field_name: "x".into(),
        });
        assert_eq!(counts.circular_references, 1);
        assert_eq!(counts.field_errors, 1);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn tag_of_ignores_plain_values() {
        assert_eq!(tag_of(&json!(3.5)), None);
        assert_eq!(tag_of(&json!({"a": 1})), None);
    }
}
