//! Bounded, cycle-safe conversion of a record tree into JSON.
//!
//! The walk is depth-limited, never re-enters a record that is still being
//! expanded, and summarizes arrays by size tier:
//!
//! | elements                    | output                                  |
//! |-----------------------------|-----------------------------------------|
//! | 1                           | the unwrapped scalar                    |
//! | < `small_array_limit`       | nested lists following the shape       |
//! | <= `oversized_limit`        | `large_array`: metadata, sample, stats  |
//! | > `oversized_limit`         | `oversized_array`: metadata only        |
//!
//! Failures are embedded as [`Marker`]s at the position where they occur.
//! The traversal state is a stack-allocated chain of ancestor identities,
//! so a [`Serializer`] holds no mutable state and can be shared freely.

use serde_json::{Map, Value as Json};

use crate::classify::{Arity, Kind, classify};
use crate::config::{ConfigResult, SerializerConfig};
use crate::error::AccessError;
use crate::marker::{FieldInfo, Marker, MarkerCounts, Statistics};
use crate::value::{Identity, NumericArray, Record, Scalar, Value};

/// Identities of the records currently being expanded, innermost first.
///
/// Each recursive call extends its parent's chain without mutating it, so
/// sibling branches never see each other's entries.
#[derive(Debug, Clone, Copy)]
struct Ancestors<'a> {
    id: Identity,
    parent: Option<&'a Ancestors<'a>>,
}

impl Ancestors<'_> {
    fn contains(&self, id: Identity) -> bool {
        let mut cur = Some(self);
        while let Some(node) = cur {
            if node.id == id {
                return true;
            }
            cur = node.parent;
        }
        false
    }
}

/// Depth- and size-bounded JSON serializer.
#[derive(Debug, Clone)]
pub struct Serializer {
    config: SerializerConfig,
}

impl Serializer {
    /// Create a serializer. Fails once, up front, on a zero depth limit.
    pub fn new(config: SerializerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Serialize a whole value with fresh traversal state.
    ///
    /// Fails only when the value itself is a back-reference whose target is gone.
    pub fn serialize(&self, value: &Value) -> Result<Json, AccessError> {
        self.serialize_counted(value).map(|(json, _)| json)
    }

    /// Like [`Serializer::serialize`], also returning the failure markers
    /// emitted along the way.
    pub fn serialize_counted(&self, value: &Value) -> Result<(Json, MarkerCounts), AccessError> {
        let value = value.resolve()?;
        let mut counts = MarkerCounts::default();
        let json = self.walk(&value, 0, None, &mut counts);
        Ok((json, counts))
    }

    fn walk(
        &self,
        value: &Value,
        depth: usize,
        visiting: Option<&Ancestors<'_>>,
        counts: &mut MarkerCounts,
    ) -> Json {
        if depth > self.config.max_depth {
            return counts.emit(Marker::MaxDepthExceeded {
                current_depth: depth,
                max_depth: self.config.max_depth,
                object_type: value.type_name().to_string(),
            });
        }

        let value = match value.resolve() {
            Ok(v) => v,
            Err(e) => {
                return counts.emit(Marker::ConversionError {
                    error: e.to_string(),
                    object_type: value.type_name().to_string(),
                    depth,
                });
            }
        };

        if let (Some(id), Some(chain)) = (value.identity(), visiting) {
            if chain.contains(id) {
                return counts.emit(Marker::CircularReference {
                    object_type: value.type_name().to_string(),
                    depth,
                });
            }
        }

        match (classify(&value), &value) {
            (Kind::Record(Arity::Single), Value::Record(rec)) => {
                let me = Ancestors {
                    id: Identity::of(rec),
                    parent: visiting,
                };
                self.record_fields(rec, depth, &me, counts)
            }
            (Kind::Record(_), Value::Record(rec)) => collection_metadata(rec),
            (Kind::Array, Value::Array(arr)) => self.array(arr, depth, visiting, counts),
            (Kind::Scalar, Value::Scalar(s)) => scalar_or_marker(*s, depth).unwrap_or_else(|m| counts.emit(m)),
            (Kind::Container, Value::List(items)) => Json::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, depth + 1, visiting, counts))
                    .collect(),
            ),
            (Kind::Container, Value::Map(entries)) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.walk(v, depth + 1, visiting, counts)))
                    .collect(),
            ),
            (_, Value::Text(s)) => Json::String(s.clone()),
            _ => Json::Null,
        }
    }

    fn record_fields(&self, rec: &Record, depth: usize, me: &Ancestors<'_>, counts: &mut MarkerCounts) -> Json {
        let mut out = Map::new();
        for (name, field) in rec.fields() {
            let json = match field.resolve() {
                Ok(resolved) => self.walk(&resolved, depth + 1, Some(me), counts),
                Err(e) => counts.emit(Marker::FieldExtractionError {
                    error: e.to_string(),
                    field_name: name.to_string(),
                }),
            };
            out.insert(name.to_string(), json);
        }
        Json::Object(out)
    }

    fn array(
        &self,
        arr: &NumericArray,
        depth: usize,
        visiting: Option<&Ancestors<'_>>,
        counts: &mut MarkerCounts,
    ) -> Json {
        let size = arr.len();
        if size > self.config.oversized_limit {
            return Marker::OversizedArray {
                shape: arr.shape().to_vec(),
                dtype: arr.element_kind(),
                size,
            }
            .to_json();
        }
        if let Some(single) = arr.single() {
            return self.walk(&Value::Scalar(single), depth + 1, visiting, counts);
        }
        if size < self.config.small_array_limit {
            return nested_list(arr, depth, counts);
        }

        let sample_values = arr
            .iter()
            .take(self.config.sample_size)
            .map(|s| scalar_or_marker(s, depth).unwrap_or_else(|m| counts.emit(m)))
            .collect();
        let statistics = self
            .config
            .include_statistics
            .then(|| statistics(&arr.to_f64_vec()));
        Marker::LargeArray {
            shape: arr.shape().to_vec(),
            dtype: arr.element_kind(),
            size,
            sample_values,
            statistics,
        }
        .to_json()
    }
}

fn collection_metadata(rec: &Record) -> Json {
    let field_info = rec
        .fields()
        .map(|(name, value)| {
            let value = value.resolve().unwrap_or_else(|_| value.clone());
            FieldInfo {
                name: name.to_string(),
                shape: value.shape(),
                dtype: value.dtype(),
                size: value.size(),
            }
        })
        .collect();
    Marker::StructuredArray {
        shape: rec.shape().to_vec(),
        dtype: "record".into(),
        fields: rec.field_names().to_vec(),
        field_info,
        size: rec.instance_count(),
    }
    .to_json()
}

/// Convert a scalar to the nearest JSON primitive.
pub fn scalar_json(s: Scalar, depth: usize) -> Json {
    scalar_or_marker(s, depth).unwrap_or_else(|m| m.to_json())
}

fn scalar_or_marker(s: Scalar, depth: usize) -> Result<Json, Marker> {
    match s {
        Scalar::Bool(b) => Ok(Json::Bool(b)),
        Scalar::Int(i) => Ok(Json::from(i)),
        Scalar::UInt(u) => Ok(Json::from(u)),
        Scalar::Float(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .ok_or_else(|| Marker::ConversionError {
                error: format!("non-finite float {f} has no JSON representation"),
                object_type: "float64".into(),
                depth,
            }),
    }
}

fn nested_list(arr: &NumericArray, depth: usize, counts: &mut MarkerCounts) -> Json {
    if arr.ndim() <= 1 {
        Json::Array(
            arr.iter()
                .map(|s| scalar_or_marker(s, depth).unwrap_or_else(|m| counts.emit(m)))
                .collect(),
        )
    } else {
        Json::Array(arr.outer().iter().map(|sub| nested_list(sub, depth, counts)).collect())
    }
}

/// Population statistics; every entry is `None` for empty input or when any
/// element is NaN.
pub fn statistics(values: &[f64]) -> Statistics {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return Statistics {
            min: None,
            max: None,
            mean: None,
            std: None,
        };
    }
    let n = values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let finite = |x: f64| x.is_finite().then_some(x);
    Statistics {
        min: finite(min),
        max: finite(max),
        mean: finite(mean),
        std: finite(var.sqrt()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use serde_json::json;

    use super::*;
    use crate::marker::tag_of;

    fn serializer() -> Serializer {
        Serializer::new(SerializerConfig::default()).unwrap()
    }

    fn floats(n: usize) -> Value {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Value::array(NumericArray::from_f64(&[n], data).unwrap())
    }

    #[test]
    fn zero_depth_limit_is_a_config_error() {
        let err = Serializer::new(SerializerConfig {
            max_depth: 0,
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn single_element_array_unwraps() {
        let v = Value::array(NumericArray::from_f64(&[1, 1], vec![3.5]).unwrap());
        assert_eq!(serializer().serialize(&v).unwrap(), json!(3.5));
    }

    #[test]
    fn small_array_emitted_whole() {
        let out = serializer().serialize(&floats(50)).unwrap();
        let list = out.as_array().unwrap();
        assert_eq!(list.len(), 50);
        assert_eq!(list[49], json!(49.0));
    }

    #[test]
    fn small_matrix_keeps_its_shape() {
        let v = Value::array(NumericArray::from_i64(&[2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap());
        assert_eq!(serializer().serialize(&v).unwrap(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn large_array_is_sampled_deterministically() {
        let s = serializer();
        let out = s.serialize(&floats(500)).unwrap();
        assert_eq!(tag_of(&out), Some("large_array"));
        assert_eq!(out["size"], 500);
        assert_eq!(out["shape"], json!([500]));
        let sample: Vec<f64> = out["sample_values"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(sample, (0..10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(out["statistics"]["min"], json!(0.0));
        assert_eq!(out["statistics"]["max"], json!(499.0));
        assert_eq!(out["statistics"]["mean"], json!(249.5));
        assert_eq!(s.serialize(&floats(500)).unwrap(), out);
    }

    #[test]
    fn oversized_array_has_no_element_data() {
        let s = Serializer::new(SerializerConfig {
            oversized_limit: 200,
            ..Default::default()
        })
        .unwrap();
        let out = s.serialize(&floats(500)).unwrap();
        assert_eq!(tag_of(&out), Some("oversized_array"));
        assert!(out.get("sample_values").is_none());
    }

    #[test]
    fn record_collection_emits_metadata_only() {
        let rec = Record::collection(
            vec![1, 2],
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::from(1.0), Value::from(2.0)],
                vec![Value::from(3.0), Value::from(4.0)],
            ],
        )
        .unwrap();
        let out = serializer().serialize(&Value::record(rec)).unwrap();
        assert_eq!(tag_of(&out), Some("structured_array"));
        assert_eq!(out["fields"], json!(["a", "b"]));
        assert_eq!(
            out["field_info"][0],
            json!({ "name": "a", "shape": [], "dtype": "float64", "size": 1 })
        );
        assert_eq!(out["size"], 2);
        assert_eq!(out["shape"], json!([1, 2]));
    }

    #[test]
    fn self_reference_yields_circular_marker() {
        let rec = Arc::new_cyclic(|weak: &Weak<Record>| {
            Record::single([("x", Value::from(1_i64)), ("self", Value::BackRef(weak.clone()))]).unwrap()
        });
        let out = serializer().serialize(&Value::Record(rec)).unwrap();
        assert_eq!(out["x"], json!(1));
        assert_eq!(tag_of(&out["self"]), Some("circular_reference"));
        assert_eq!(out["self"]["depth"], 1);
    }

    #[test]
    fn transitive_cycle_detected_at_reentry() {
        // a -> b -> back to a
        let a = Arc::new_cyclic(|weak_a: &Weak<Record>| {
            let b = Record::single([("up", Value::BackRef(weak_a.clone()))]).unwrap();
            Record::single([("b", Value::record(b))]).unwrap()
        });
        let out = serializer().serialize(&Value::Record(a)).unwrap();
        assert_eq!(tag_of(&out["b"]["up"]), Some("circular_reference"));
    }

    #[test]
    fn shared_sibling_is_not_a_cycle() {
        let shared = Arc::new(Record::single([("v", Value::from(2.0))]).unwrap());
        let root = Record::single([
            ("left", Value::Record(shared.clone())),
            ("right", Value::Record(shared)),
        ])
        .unwrap();
        let out = serializer().serialize(&Value::record(root)).unwrap();
        assert_eq!(out["left"], json!({"v": 2.0}));
        assert_eq!(out["right"], json!({"v": 2.0}));
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let mut v = Value::from(1.0);
        for _ in 0..5 {
            v = Value::record(Record::single([("inner", v)]).unwrap());
        }
        let s = Serializer::new(SerializerConfig {
            max_depth: 2,
            ..Default::default()
        })
        .unwrap();
        let out = s.serialize(&v).unwrap();
        let marker = &out["inner"]["inner"]["inner"];
        assert_eq!(tag_of(marker), Some("max_depth_exceeded"));
        assert_eq!(marker["current_depth"], 3);
        assert_eq!(marker["max_depth"], 2);
        assert_eq!(marker["object_type"], "record");
    }

    #[test]
    fn non_finite_float_becomes_conversion_error_in_place() {
        let v = Value::List(vec![Value::from(1.0), Value::from(f64::NAN), Value::from(2.0)]);
        let out = serializer().serialize(&v).unwrap();
        assert_eq!(out[0], json!(1.0));
        assert_eq!(tag_of(&out[1]), Some("conversion_error"));
        assert_eq!(out[2], json!(2.0));
    }

    #[test]
    fn dangling_field_is_isolated_to_that_field() {
        let weak = Arc::downgrade(&Arc::new(Record::single([("x", Value::Null)]).unwrap()));
        let rec = Record::single([("gone", Value::BackRef(weak)), ("ok", Value::from(true))]).unwrap();
        let out = serializer().serialize(&Value::record(rec)).unwrap();
        assert_eq!(tag_of(&out["gone"]), Some("field_extraction_error"));
        assert_eq!(out["gone"]["field_name"], "gone");
        assert_eq!(out["ok"], json!(true));
    }

    #[test]
    fn dangling_top_level_fails_the_call() {
        let weak = Arc::downgrade(&Arc::new(Record::single([("x", Value::Null)]).unwrap()));
        assert!(serializer().serialize(&Value::BackRef(weak)).is_err());
    }

    #[test]
    fn containers_preserve_order_and_opaque_passes_through() {
        let v = Value::Map(vec![
            ("z".into(), Value::from("text")),
            ("a".into(), Value::Null),
            ("m".into(), Value::List(vec![Value::from(1_i64), Value::from(false)])),
        ]);
        let out = serializer().serialize(&v).unwrap();
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
        assert_eq!(out["z"], "text");
        assert_eq!(out["a"], Json::Null);
        assert_eq!(out["m"], json!([1, false]));
    }

    #[test]
    fn markers_are_counted_where_they_are_emitted() {
        let rec = Arc::new_cyclic(|weak: &Weak<Record>| {
            Record::single([
                ("self", Value::BackRef(weak.clone())),
                ("bad", Value::List(vec![Value::from(f64::NAN), Value::from(f64::INFINITY)])),
            ])
            .unwrap()
        });
        let (_, counts) = serializer().serialize_counted(&Value::Record(rec)).unwrap();
        assert_eq!(counts.circular_references, 1);
        assert_eq!(counts.conversion_errors, 2);
        assert_eq!(counts.max_depth_exceeded, 0);
    }

    #[test]
    fn data_that_looks_like_a_marker_is_not_counted() {
        let v = Value::Map(vec![
            ("type".into(), Value::from("circular_reference")),
            ("note".into(), Value::from("user data")),
        ]);
        let (out, counts) = serializer().serialize_counted(&v).unwrap();
        assert_eq!(tag_of(&out), Some("circular_reference"));
        assert_eq!(counts, MarkerCounts::default());
    }

    #[test]
    fn statistics_over_known_values() {
        let st = statistics(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(st.mean, Some(5.0));
        assert_eq!(st.std, Some(2.0));
        assert_eq!(st.min, Some(2.0));
        assert_eq!(st.max, Some(9.0));

        let nan = statistics(&[1.0, f64::NAN]);
        assert_eq!(nan.mean, None);
        assert_eq!(statistics(&[]).min, None);
    }
}
