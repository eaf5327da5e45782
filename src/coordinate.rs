//! Coordinate extraction along the entity (first) and time (last) axes.
//!
//! Bounds are always checked before indexing:
//!
//! - rank 0: the scalar itself;
//! - rank 1: the whole array, since one axis cannot encode both entity and time;
//! - rank >= 2: a cycle past the time axis is a [`RangeError`]; an entity
//!   inside the entity axis pins both axes (`[e, ..., c]`); an entity past it
//!   falls back to every entity at that cycle (`[..., c]`).
//!
//! The fallback returns a differently shaped value, so callers discriminate
//! by [`ExtractionMethod`], never by shape.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::RangeError;
use crate::value::{NumericArray, Value};

/// Which extraction policy produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Rank-0 field: returned as is.
    Scalar,
    /// Rank-1 field: returned whole, not cycle-indexed.
    FullValue,
    /// One entity at one cycle.
    SingleEntity,
    /// Entity index out of range: every entity at one cycle.
    AllEntities,
    /// Cycle index out of range.
    OutOfRange,
    /// Non-array field (record, container, opaque): returned as is.
    Direct,
    /// The field could not be read.
    Error,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionMethod::Scalar => "scalar",
            ExtractionMethod::FullValue => "full_value",
            ExtractionMethod::SingleEntity => "single_entity",
            ExtractionMethod::AllEntities => "all_entities",
            ExtractionMethod::OutOfRange => "out_of_range",
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Error => "error",
        };
        f.write_str(name)
    }
}

/// One position of an index expression, as reported back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// A pinned axis.
    At(usize),
    /// Every entity.
    All,
    /// Intermediate axes kept whole.
    Rest,
}

impl Serialize for Index {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Index::At(i) => s.serialize_u64(*i as u64),
            Index::All => s.serialize_str("all"),
            Index::Rest => s.serialize_str("..."),
        }
    }
}

/// Result of a successful coordinate extraction.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub method: ExtractionMethod,
    pub value: Value,
    /// Index expression applied; empty when nothing was indexed.
    pub indices: Vec<Index>,
}

impl Extracted {
    fn whole(method: ExtractionMethod, value: Value) -> Self {
        Self {
            method,
            value,
            indices: Vec::new(),
        }
    }
}

/// Apply the entity/cycle indexing policy to a field value.
pub fn extract(field: &Value, entity_id: usize, cycle_number: usize) -> Result<Extracted, RangeError> {
    let arr = match field {
        Value::Scalar(_) => return Ok(Extracted::whole(ExtractionMethod::Scalar, field.clone())),
        Value::Array(arr) => arr,
        _ => return Ok(Extracted::whole(ExtractionMethod::Direct, field.clone())),
    };

    match arr.ndim() {
        0 => {
            let value = arr.single().map(Value::Scalar).unwrap_or_else(|| field.clone());
            Ok(Extracted::whole(ExtractionMethod::Scalar, value))
        }
        1 => Ok(Extracted::whole(ExtractionMethod::FullValue, field.clone())),
        rank => {
            let shape = arr.shape();
            let time_len = shape[rank - 1];
            if time_len == 0 {
                return Err(RangeError::EmptyTimeAxis {
                    requested_cycle: cycle_number,
                    field_shape: shape.to_vec(),
                });
            }
            if cycle_number >= time_len {
                return Err(RangeError::Cycle {
                    requested_cycle: cycle_number,
                    max_cycle: time_len - 1,
                    field_shape: shape.to_vec(),
                });
            }

            let (method, entity, indices) = if entity_id < shape[0] {
                let indices = if rank == 2 {
                    vec![Index::At(entity_id), Index::At(cycle_number)]
                } else {
                    vec![Index::At(entity_id), Index::Rest, Index::At(cycle_number)]
                };
                (ExtractionMethod::SingleEntity, Some(entity_id), indices)
            } else {
                (
                    ExtractionMethod::AllEntities,
                    None,
                    vec![Index::All, Index::At(cycle_number)],
                )
            };

            let pinned = arr.pin(entity, cycle_number).ok_or_else(|| RangeError::Cycle {
                requested_cycle: cycle_number,
                max_cycle: time_len - 1,
                field_shape: shape.to_vec(),
            })?;
            Ok(Extracted {
                method,
                value: into_value(pinned),
                indices,
            })
        }
    }
}

fn into_value(arr: NumericArray) -> Value {
    if arr.ndim() == 0 {
        if let Some(s) = arr.single() {
            return Value::Scalar(s);
        }
    }
    Value::Array(Arc::new(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, Scalar};

    /// vel[e, t] = 1000 * e + t, shape (4, 200)
    fn vel() -> Value {
        let data: Vec<f64> = (0..4)
            .flat_map(|e| (0..200).map(move |t| f64::from(1000 * e + t)))
            .collect();
        Value::array(NumericArray::from_f64(&[4, 200], data).unwrap())
    }

    #[test]
    fn rank_two_single_entity() {
        let out = extract(&vel(), 1, 50).unwrap();
        assert_eq!(out.method, ExtractionMethod::SingleEntity);
        assert!(matches!(out.value, Value::Scalar(Scalar::Float(x)) if x == 1050.0));
        assert_eq!(out.indices, vec![Index::At(1), Index::At(50)]);
    }

    #[test]
    fn cycle_past_time_axis_is_range_error() {
        let err = extract(&vel(), 1, 500).unwrap_err();
        assert_eq!(
            err,
            RangeError::Cycle {
                requested_cycle: 500,
                max_cycle: 199,
                field_shape: vec![4, 200],
            }
        );
        // boundary
        assert!(extract(&vel(), 0, 199).is_ok());
        assert!(extract(&vel(), 0, 200).is_err());
    }

    #[test]
    fn entity_past_entity_axis_falls_back_to_all_entities() {
        let out = extract(&vel(), 10, 50).unwrap();
        assert_eq!(out.method, ExtractionMethod::AllEntities);
        match out.value {
            Value::Array(arr) => {
                assert_eq!(arr.shape(), &[4]);
                assert_eq!(arr.to_f64_vec(), vec![50.0, 1050.0, 2050.0, 3050.0]);
            }
            other => panic!("expected array, got {other:?}"),
        }
        assert_eq!(out.indices, vec![Index::All, Index::At(50)]);
    }

    #[test]
    fn higher_rank_keeps_intermediate_axes() {
        let data: Vec<i64> = (0..2 * 3 * 5).collect();
        let field = Value::array(NumericArray::from_i64(&[2, 3, 5], data).unwrap());

        let one = extract(&field, 1, 4).unwrap();
        assert_eq!(one.method, ExtractionMethod::SingleEntity);
        assert_eq!(one.indices, vec![Index::At(1), Index::Rest, Index::At(4)]);
        let Value::Array(arr) = one.value else { panic!("expected array") };
        assert_eq!(arr.shape(), &[3]);
        assert_eq!(arr.to_f64_vec(), vec![19.0, 24.0, 29.0]);

        let all = extract(&field, 7, 4).unwrap();
        assert_eq!(all.method, ExtractionMethod::AllEntities);
        let Value::Array(arr) = all.value else { panic!("expected array") };
        assert_eq!(arr.shape(), &[2, 3]);
    }

    #[test]
    fn rank_one_returned_whole() {
        let field = Value::array(NumericArray::from_f64(&[3], vec![1.0, 2.0, 3.0]).unwrap());
        let out = extract(&field, 0, 1000).unwrap();
        assert_eq!(out.method, ExtractionMethod::FullValue);
        assert_eq!(out.value.identity(), field.identity());
    }

    #[test]
    fn scalars_ignore_indices() {
        let out = extract(&Value::from(3.5), 99, 99).unwrap();
        assert_eq!(out.method, ExtractionMethod::Scalar);

        let zero_d = Value::array(NumericArray::from_i64(&[], vec![7]).unwrap());
        let out = extract(&zero_d, 99, 99).unwrap();
        assert_eq!(out.method, ExtractionMethod::Scalar);
        assert!(matches!(out.value, Value::Scalar(Scalar::Int(7))));
    }

    #[test]
    fn empty_time_axis_is_range_error() {
        let field = Value::array(NumericArray::from_f64(&[4, 0], vec![]).unwrap());
        assert!(matches!(
            extract(&field, 0, 0),
            Err(RangeError::EmptyTimeAxis { .. })
        ));
    }

    #[test]
    fn records_pass_through_directly() {
        let rec = Value::record(Record::single([("a", Value::Null)]).unwrap());
        let out = extract(&rec, 0, 0).unwrap();
        assert_eq!(out.method, ExtractionMethod::Direct);
        assert_eq!(out.value.identity(), rec.identity());
    }

    #[test]
    fn method_tags_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(ExtractionMethod::AllEntities).unwrap(),
            serde_json::json!("all_entities")
        );
        assert_eq!(ExtractionMethod::FullValue.to_string(), "full_value");
        assert_eq!(
            serde_json::to_value(vec![Index::All, Index::Rest, Index::At(3)]).unwrap(),
            serde_json::json!(["all", "...", 3])
        );
    }
}
