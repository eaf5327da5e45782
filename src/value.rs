//! In-memory record tree handed to the extractor by a source loader.
//!
//! Records and numeric arrays are reference counted so the same object can be
//! reachable through several paths. A record may also point back at one of
//! its enclosing records through a [`Value::BackRef`], which is how cycles
//! are expressed without leaking memory.

use std::fmt;
use std::sync::{Arc, Weak};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, RecordError};

/// Shape of a single-instance record, following the 1x1 struct convention of
/// the simulation tools that produce these trees.
pub const SINGLE_RECORD_SHAPE: [usize; 2] = [1, 1];

/// Any value that can appear in a record tree.
#[derive(Debug, Clone)]
pub enum Value {
    /// Named-field structured container (one or many instances).
    Record(Arc<Record>),
    /// Non-owning reference to an enclosing record.
    BackRef(Weak<Record>),
    /// Homogeneous numeric or boolean N-dimensional array.
    Array(Arc<NumericArray>),
    /// A single numeric or boolean value.
    Scalar(Scalar),
    /// Ordered sequence of heterogeneous values.
    List(Vec<Value>),
    /// Key/value mapping of heterogeneous values, in insertion order.
    Map(Vec<(String, Value)>),
    /// Free text, passed through unchanged.
    Text(String),
    /// Absent value, passed through unchanged.
    Null,
}

/// Stable identity of a shared object, valid while the object is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(usize);

impl Identity {
    /// Identity of the object behind a shared pointer.
    pub fn of<T>(shared: &Arc<T>) -> Self {
        Identity(Arc::as_ptr(shared) as usize)
    }
}

impl Value {
    /// Wrap a record.
    pub fn record(record: Record) -> Self {
        Value::Record(Arc::new(record))
    }

    /// Wrap a numeric array.
    pub fn array(array: NumericArray) -> Self {
        Value::Array(Arc::new(array))
    }

    /// Follow a back-reference to its target. Every other value resolves to itself.
    pub fn resolve(&self) -> Result<Value, AccessError> {
        match self {
            Value::BackRef(weak) => weak
                .upgrade()
                .map(Value::Record)
                .ok_or(AccessError::Dangling),
            other => Ok(other.clone()),
        }
    }

    /// Identity of shared objects; `None` for values owned by their parent.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::Record(rec) => Some(Identity::of(rec)),
            Value::BackRef(weak) => Some(Identity(weak.as_ptr() as usize)),
            Value::Array(arr) => Some(Identity::of(arr)),
            _ => None,
        }
    }

    /// Short human-readable type name used in markers and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Record(rec) if rec.is_single() => "record",
            Value::Record(_) => "record_collection",
            Value::BackRef(_) => "back_reference",
            Value::Array(_) => "array",
            Value::Scalar(s) => s.type_name(),
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Text(_) => "text",
            Value::Null => "null",
        }
    }

    /// Element count: array elements, record instances, container entries.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Record(rec) => Some(rec.instance_count()),
            Value::Array(arr) => Some(arr.len()),
            Value::Scalar(_) => Some(1),
            Value::List(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Element type name: the dtype for arrays, the type name otherwise.
    pub fn dtype(&self) -> String {
        match self {
            Value::Array(arr) => arr.element_kind().to_string(),
            other => other.type_name().to_string(),
        }
    }

    /// Shape of the value: arrays and records report their own, scalars `[]`.
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Value::Record(rec) => Some(rec.shape().to_vec()),
            Value::Array(arr) => Some(arr.shape().to_vec()),
            Value::Scalar(_) => Some(Vec::new()),
            Value::List(items) => Some(vec![items.len()]),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(Scalar::Float(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar(Scalar::Int(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(Scalar::Bool(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// A single numeric or boolean value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int64",
            Scalar::UInt(_) => "uint64",
            Scalar::Float(_) => "float64",
        }
    }

    /// Numeric view used for summary statistics. Booleans count as 0/1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(f) => f,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Float(x) => write!(f, "{x}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Numeric arrays
// ---------------------------------------------------------------------------

/// Element type of a [`NumericArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bool,
    Int64,
    UInt64,
    Float64,
}

impl ElementKind {
    /// Parse a dtype name as written in source documents.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(ElementKind::Bool),
            "int64" | "int32" | "int16" | "int8" => Some(ElementKind::Int64),
            "uint64" | "uint32" | "uint16" | "uint8" => Some(ElementKind::UInt64),
            "float64" | "float32" | "double" | "single" => Some(ElementKind::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Bool => "bool",
            ElementKind::Int64 => "int64",
            ElementKind::UInt64 => "uint64",
            ElementKind::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Homogeneous N-dimensional array. Axis 0 is the entity axis and the last
/// axis is the time axis.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    Bool(ArrayD<bool>),
    Int64(ArrayD<i64>),
    UInt64(ArrayD<u64>),
    Float64(ArrayD<f64>),
}

macro_rules! dispatch {
    ($arr:expr, $a:ident => $body:expr) => {
        match $arr {
            NumericArray::Bool($a) => $body,
            NumericArray::Int64($a) => $body,
            NumericArray::UInt64($a) => $body,
            NumericArray::Float64($a) => $body,
        }
    };
}

impl NumericArray {
    /// Build an array of `f64` from row-major data.
    pub fn from_f64(shape: &[usize], data: Vec<f64>) -> Result<Self, RecordError> {
        from_shape_vec(shape, data).map(NumericArray::Float64)
    }

    /// Build an array of `i64` from row-major data.
    pub fn from_i64(shape: &[usize], data: Vec<i64>) -> Result<Self, RecordError> {
        from_shape_vec(shape, data).map(NumericArray::Int64)
    }

    /// Build an array of `u64` from row-major data.
    pub fn from_u64(shape: &[usize], data: Vec<u64>) -> Result<Self, RecordError> {
        from_shape_vec(shape, data).map(NumericArray::UInt64)
    }

    /// Build an array of `bool` from row-major data.
    pub fn from_bool(shape: &[usize], data: Vec<bool>) -> Result<Self, RecordError> {
        from_shape_vec(shape, data).map(NumericArray::Bool)
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        dispatch!(self, a => a.ndim())
    }

    /// Total element count (product of the shape).
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_kind(&self) -> ElementKind {
        match self {
            NumericArray::Bool(_) => ElementKind::Bool,
            NumericArray::Int64(_) => ElementKind::Int64,
            NumericArray::UInt64(_) => ElementKind::UInt64,
            NumericArray::Float64(_) => ElementKind::Float64,
        }
    }

    /// Elements in logical row-major order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Scalar> + '_> {
        match self {
            NumericArray::Bool(a) => Box::new(a.iter().map(|&v| Scalar::Bool(v))),
            NumericArray::Int64(a) => Box::new(a.iter().map(|&v| Scalar::Int(v))),
            NumericArray::UInt64(a) => Box::new(a.iter().map(|&v| Scalar::UInt(v))),
            NumericArray::Float64(a) => Box::new(a.iter().map(|&v| Scalar::Float(v))),
        }
    }

    /// The only element of a one-element array.
    pub fn single(&self) -> Option<Scalar> {
        if self.len() == 1 { self.iter().next() } else { None }
    }

    /// Sub-arrays along axis 0. Empty for 0-dimensional arrays.
    pub fn outer(&self) -> Vec<NumericArray> {
        if self.ndim() == 0 {
            return Vec::new();
        }
        match self {
            NumericArray::Bool(a) => a.outer_iter().map(|v| NumericArray::Bool(v.to_owned())).collect(),
            NumericArray::Int64(a) => a.outer_iter().map(|v| NumericArray::Int64(v.to_owned())).collect(),
            NumericArray::UInt64(a) => a.outer_iter().map(|v| NumericArray::UInt64(v.to_owned())).collect(),
            NumericArray::Float64(a) => a.outer_iter().map(|v| NumericArray::Float64(v.to_owned())).collect(),
        }
    }

    /// Pin the last axis at `cycle` and, when given, axis 0 at `entity`.
    ///
    /// Callers must check bounds first: `ndim() >= 2`, `cycle < shape[-1]`
    /// and `entity < shape[0]`. Returns `None` instead of panicking when they
    /// do not hold.
    pub fn pin(&self, entity: Option<usize>, cycle: usize) -> Option<NumericArray> {
        let shape = self.shape();
        let last = shape.len().checked_sub(1).filter(|&l| l >= 1)?;
        if cycle >= shape[last] || entity.is_some_and(|e| e >= shape[0]) {
            return None;
        }
        Some(match self {
            NumericArray::Bool(a) => NumericArray::Bool(pin_axes(a, entity, cycle)),
            NumericArray::Int64(a) => NumericArray::Int64(pin_axes(a, entity, cycle)),
            NumericArray::UInt64(a) => NumericArray::UInt64(pin_axes(a, entity, cycle)),
            NumericArray::Float64(a) => NumericArray::Float64(pin_axes(a, entity, cycle)),
        })
    }

    /// Flatten to `f64` in row-major order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter().map(|s| s.as_f64()).collect()
    }
}

fn from_shape_vec<T>(shape: &[usize], data: Vec<T>) -> Result<ArrayD<T>, RecordError> {
    let len = data.len();
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| RecordError::ArrayShape {
        shape: shape.to_vec(),
        len,
    })
}

fn pin_axes<T: Clone>(a: &ArrayD<T>, entity: Option<usize>, cycle: usize) -> ArrayD<T> {
    let last = a.ndim() - 1;
    let by_cycle = a.index_axis(ndarray::Axis(last), cycle);
    match entity {
        Some(e) => by_cycle.index_axis(ndarray::Axis(0), e).to_owned(),
        None => by_cycle.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Named-field structured container.
///
/// A record holds `product(shape)` instances, each carrying one value per
/// field name. A record with exactly one instance is "single" and its fields
/// are directly addressable.
#[derive(Debug, Clone)]
pub struct Record {
    shape: Vec<usize>,
    field_names: Vec<String>,
    instances: Vec<Vec<Value>>,
}

impl Record {
    /// Build a single-instance record from ordered `(name, value)` pairs.
    pub fn single<N: Into<String>>(
        fields: impl IntoIterator<Item = (N, Value)>,
    ) -> Result<Self, RecordError> {
        let (names, values): (Vec<String>, Vec<Value>) =
            fields.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::collection(SINGLE_RECORD_SHAPE.to_vec(), names, vec![values])
    }

    /// Build a record collection. Every instance holds one value per field name.
    pub fn collection(
        shape: Vec<usize>,
        field_names: Vec<String>,
        instances: Vec<Vec<Value>>,
    ) -> Result<Self, RecordError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| RecordError::ShapeOverflow { shape: shape.clone() })?;
        if expected != instances.len() {
            return Err(RecordError::ShapeMismatch {
                shape,
                expected,
                actual: instances.len(),
            });
        }
        for (i, name) in field_names.iter().enumerate() {
            if field_names[..i].contains(name) {
                return Err(RecordError::DuplicateField { name: name.clone() });
            }
        }
        for (index, values) in instances.iter().enumerate() {
            if values.len() != field_names.len() {
                return Err(RecordError::FieldMismatch {
                    index,
                    expected: field_names.len(),
                    found: values.len(),
                });
            }
        }
        Ok(Self {
            shape,
            field_names,
            instances,
        })
    }

    /// A record collection with no fields and no instances.
    pub fn empty() -> Self {
        Self {
            shape: vec![0, 0],
            field_names: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// `true` when the record holds exactly one logical instance.
    pub fn is_single(&self) -> bool {
        self.instances.len() == 1
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_names.iter().any(|n| n == name)
    }

    /// Value of `name` in instance `index`.
    pub fn field_at(&self, index: usize, name: &str) -> Option<&Value> {
        let pos = self.field_names.iter().position(|n| n == name)?;
        self.instances.get(index).and_then(|row| row.get(pos))
    }

    /// Value of `name` in the first instance.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.field_at(0, name)
    }

    /// `(name, value)` pairs of the first instance, in field order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        let row = self.instances.first();
        self.field_names
            .iter()
            .enumerate()
            .filter_map(move |(i, n)| row.and_then(|r| r.get(i)).map(|v| (n.as_str(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_has_one_by_one_shape() {
        let rec = Record::single([("a", Value::from(1.0)), ("b", Value::from(true))]).unwrap();
        assert!(rec.is_single());
        assert_eq!(rec.shape(), &[1, 1]);
        assert_eq!(rec.field_names(), &["a".to_string(), "b".to_string()]);
        assert!(matches!(rec.field("b"), Some(Value::Scalar(Scalar::Bool(true)))));
        assert!(rec.field("c").is_none());
    }

    #[test]
    fn collection_shape_must_match_instances() {
        let err = Record::collection(vec![2, 2], vec!["x".into()], vec![vec![Value::Null]]).unwrap_err();
        assert!(matches!(err, RecordError::ShapeMismatch { expected: 4, actual: 1, .. }));
    }

    #[test]
    fn overflowing_shape_rejected() {
        let err = Record::collection(vec![1 << 32, 1 << 32, 4], vec!["x".into()], vec![]).unwrap_err();
        assert!(matches!(err, RecordError::ShapeOverflow { .. }));
    }

    #[test]
    fn size_and_dtype_describe_values() {
        let arr = Value::array(NumericArray::from_i64(&[2, 3], vec![0; 6]).unwrap());
        assert_eq!(arr.size(), Some(6));
        assert_eq!(arr.dtype(), "int64");
        assert_eq!(Value::from(1.5).size(), Some(1));
        assert_eq!(Value::from(1.5).dtype(), "float64");
        assert_eq!(Value::Null.size(), None);
    }

    #[test]
    fn duplicate_field_names_rejected() {
        let err = Record::single([("x", Value::Null), ("x", Value::Null)]).unwrap_err();
        assert!(matches!(err, RecordError::DuplicateField { .. }));
    }

    #[test]
    fn back_reference_resolves_while_target_alive() {
        let rec = Arc::new_cyclic(|weak: &Weak<Record>| {
            Record::single([("me", Value::BackRef(weak.clone()))]).unwrap()
        });
        let back = rec.field("me").unwrap().clone();
        let resolved = back.resolve().unwrap();
        assert_eq!(resolved.identity(), Value::Record(rec.clone()).identity());

        drop(rec);
        assert_eq!(back.resolve().unwrap_err(), AccessError::Dangling);
    }

    #[test]
    fn array_shape_mismatch_rejected() {
        let err = NumericArray::from_f64(&[2, 3], vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, RecordError::ArrayShape { len: 5, .. }));
    }

    #[test]
    fn pin_selects_entity_and_cycle() {
        // shape (2, 3): entity-major, time last
        let arr = NumericArray::from_i64(&[2, 3], vec![0, 1, 2, 10, 11, 12]).unwrap();
        let one = arr.pin(Some(1), 2).unwrap();
        assert_eq!(one.ndim(), 0);
        assert_eq!(one.single(), Some(Scalar::Int(12)));

        let column = arr.pin(None, 1).unwrap();
        assert_eq!(column.shape(), &[2]);
        assert_eq!(column.iter().collect::<Vec<_>>(), vec![Scalar::Int(1), Scalar::Int(11)]);
    }

    #[test]
    fn pin_refuses_out_of_bounds() {
        let arr = NumericArray::from_i64(&[2, 3], vec![0; 6]).unwrap();
        assert!(arr.pin(Some(2), 0).is_none());
        assert!(arr.pin(Some(0), 3).is_none());
        let flat = NumericArray::from_i64(&[3], vec![0; 3]).unwrap();
        assert!(flat.pin(None, 0).is_none());
    }

    #[test]
    fn pin_keeps_intermediate_axes() {
        let data: Vec<f64> = (0..24).map(f64::from).collect();
        let arr = NumericArray::from_f64(&[2, 3, 4], data).unwrap();
        let sub = arr.pin(Some(1), 3).unwrap();
        assert_eq!(sub.shape(), &[3]);
        // [1, j, 3] = 12 + 4j + 3
        assert_eq!(sub.to_f64_vec(), vec![15.0, 19.0, 23.0]);

        let all = arr.pin(None, 0).unwrap();
        assert_eq!(all.shape(), &[2, 3]);
    }
}
