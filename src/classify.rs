//! Value classification: one tagged decision per value instead of repeated
//! capability probes at every call site.

use serde::Serialize;

use crate::value::Value;

/// How many logical instances a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// Exactly one instance: fields are directly addressable.
    Single,
    /// Zero or several instances: only metadata is addressable.
    Collection,
}

/// The five kinds of value the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "arity")]
pub enum Kind {
    Record(Arity),
    Array,
    Scalar,
    Container,
    Opaque,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Record(Arity::Single) => "record",
            Kind::Record(Arity::Collection) => "record_collection",
            Kind::Array => "array",
            Kind::Scalar => "scalar",
            Kind::Container => "container",
            Kind::Opaque => "opaque",
        }
    }
}

/// Classify a value. Total and side-effect free.
///
/// A back-reference classifies as its target; a dangling one is opaque.
pub fn classify(value: &Value) -> Kind {
    match value {
        Value::Record(rec) if rec.is_single() => Kind::Record(Arity::Single),
        Value::Record(_) => Kind::Record(Arity::Collection),
        Value::BackRef(weak) => match weak.upgrade() {
            Some(rec) if rec.is_single() => Kind::Record(Arity::Single),
            Some(_) => Kind::Record(Arity::Collection),
            None => Kind::Opaque,
        },
        Value::Array(_) => Kind::Array,
        Value::Scalar(_) => Kind::Scalar,
        Value::List(_) | Value::Map(_) => Kind::Container,
        Value::Text(_) | Value::Null => Kind::Opaque,
    }
}
