//! Source loading: JSON record documents into an in-memory [`Value`] tree.
//!
//! A document is `{"variables": {name: node, ...}}`. Nodes:
//!
//! - numbers, booleans, strings and `null` map to scalars and opaque values;
//! - JSON lists map to [`Value::List`];
//! - `{"$record": {...}}` is a single-instance record (shape `[1, 1]` unless
//!   `"shape"` says otherwise);
//! - `{"$records": [{...}, ...], "shape": [..]}` is a record collection;
//! - `{"$array": {"dtype", "shape", "data"}}` is a numeric array with
//!   row-major `data`; float data may use `"NaN"`, `"Infinity"`, `"-Infinity"`;
//! - `{"$ref": id}` points at a record declared with `"$id"`: a completed
//!   record is shared, an enclosing record becomes a back-reference;
//! - any other object is a key/value [`Value::Map`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value as Json};

use crate::error::{RecordError, SourceError};
use crate::value::{ElementKind, NumericArray, Record, SINGLE_RECORD_SHAPE, Scalar, Value};

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Top-level variables of a loaded source, in document order.
#[derive(Debug, Clone)]
pub struct Source {
    origin: String,
    variables: Vec<(String, Value)>,
}

impl Source {
    /// Wrap variables produced by another loader.
    pub fn from_variables(origin: impl Into<String>, variables: Vec<(String, Value)>) -> Self {
        Self {
            origin: origin.into(),
            variables,
        }
    }

    /// Load a JSON record document from disk.
    pub fn load(path: &Path) -> SourceResult<Self> {
        tracing::info!(path = %path.display(), "loading source document");
        let text = std::fs::read_to_string(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let source = Self::from_json_str(&text, path.display().to_string())?;
        tracing::info!(variables = source.variables.len(), "source loaded");
        Ok(source)
    }

    /// Parse a JSON record document held in memory.
    pub fn from_json_str(text: &str, origin: impl Into<String>) -> SourceResult<Self> {
        let doc: Json = serde_json::from_str(text).map_err(|e| SourceError::Parse {
            message: e.to_string(),
        })?;
        Self::from_json(&doc, origin)
    }

    /// Build from an already parsed JSON document.
    pub fn from_json(doc: &Json, origin: impl Into<String>) -> SourceResult<Self> {
        let vars = doc
            .get("variables")
            .and_then(Json::as_object)
            .ok_or_else(|| SourceError::Parse {
                message: "missing top-level \"variables\" object".into(),
            })?;

        let mut builder = Builder::default();
        let mut variables = Vec::with_capacity(vars.len());
        for (name, node) in vars {
            let value = builder.node(node, &format!("$.variables.{name}"))?;
            variables.push((name.clone(), value));
        }
        Ok(Self {
            origin: origin.into(),
            variables,
        })
    }

    /// Where the source came from (file path or caller-supplied label).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// The named root variable, or a diagnostic listing what is available.
    pub fn root(&self, name: &str) -> SourceResult<Value> {
        self.variable(name).cloned().ok_or_else(|| SourceError::MissingVariable {
            name: name.to_string(),
            available: self.variable_names().join(", "),
        })
    }
}

#[derive(Default)]
struct Builder {
    /// Records with an `$id` whose construction has finished.
    completed: HashMap<String, Arc<Record>>,
    /// Records with an `$id` currently under construction, outermost first.
    enclosing: Vec<(String, Weak<Record>)>,
}

impl Builder {
    fn node(&mut self, json: &Json, path: &str) -> SourceResult<Value> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::from(*b)),
            Json::Number(n) => Ok(number(n)),
            Json::String(s) => Ok(Value::Text(s.clone())),
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.node(item, &format!("{path}[{i}]")))
                .collect::<SourceResult<Vec<_>>>()
                .map(Value::List),
            Json::Object(obj) => self.object(obj, path),
        }
    }

    fn object(&mut self, obj: &Map<String, Json>, path: &str) -> SourceResult<Value> {
        if let Some(id) = obj.get("$ref") {
            let id = id.as_str().ok_or_else(|| malformed(path, "\"$ref\" must be a string"))?;
            return self.reference(id, path);
        }
        if let Some(spec) = obj.get("$array") {
            return array(spec, &format!("{path}.$array")).map(Value::array);
        }
        if obj.contains_key("$record") || obj.contains_key("$records") {
            return self.record(obj, path);
        }
        obj.iter()
            .map(|(k, v)| -> SourceResult<(String, Value)> {
                Ok((k.clone(), self.node(v, &format!("{path}.{k}"))?))
            })
            .collect::<SourceResult<Vec<_>>>()
            .map(Value::Map)
    }

    fn reference(&self, id: &str, path: &str) -> SourceResult<Value> {
        if let Some((_, weak)) = self.enclosing.iter().rev().find(|(n, _)| n == id) {
            return Ok(Value::BackRef(weak.clone()));
        }
        if let Some(rec) = self.completed.get(id) {
            return Ok(Value::Record(rec.clone()));
        }
        Err(SourceError::UnresolvedRef {
            id: id.to_string(),
            path: path.to_string(),
        })
    }

    fn record(&mut self, obj: &Map<String, Json>, path: &str) -> SourceResult<Value> {
        let Some(id) = obj.get("$id") else {
            return self.record_body(obj, path).map(Value::record);
        };
        let id = id
            .as_str()
            .ok_or_else(|| malformed(path, "\"$id\" must be a string"))?
            .to_string();

        let mut failure = None;
        let rec = Arc::new_cyclic(|weak: &Weak<Record>| {
            self.enclosing.push((id.clone(), weak.clone()));
            let built = self.record_body(obj, path);
            self.enclosing.pop();
            built.unwrap_or_else(|e| {
                failure = Some(e);
                Record::empty()
            })
        });
        if let Some(e) = failure {
            return Err(e);
        }
        self.completed.insert(id, rec.clone());
        Ok(Value::Record(rec))
    }

    fn record_body(&mut self, obj: &Map<String, Json>, path: &str) -> SourceResult<Record> {
        let shape = obj.get("shape").map(|s| shape(s, path)).transpose()?;

        if let Some(fields) = obj.get("$record") {
            let fields = fields
                .as_object()
                .ok_or_else(|| malformed(path, "\"$record\" must be an object"))?;
            let names: Vec<String> = fields.keys().cloned().collect();
            let values = self.fields(fields, &format!("{path}.$record"))?;
            let shape = shape.unwrap_or_else(|| SINGLE_RECORD_SHAPE.to_vec());
            return Record::collection(shape, names, vec![values]).map_err(|e| record_err(path, e));
        }

        let instances = obj
            .get("$records")
            .and_then(Json::as_array)
            .ok_or_else(|| malformed(path, "\"$records\" must be a list of objects"))?;
        let mut names: Option<Vec<String>> = None;
        let mut rows = Vec::with_capacity(instances.len());
        for (i, inst) in instances.iter().enumerate() {
            let inst_path = format!("{path}.$records[{i}]");
            let fields = inst
                .as_object()
                .ok_or_else(|| malformed(&inst_path, "record instance must be an object"))?;
            let these: Vec<String> = fields.keys().cloned().collect();
            match &names {
                Some(expected) if *expected != these => {
                    return Err(malformed(
                        &inst_path,
                        &format!("fields {these:?} differ from first instance {expected:?}"),
                    ));
                }
                Some(_) => {}
                None => names = Some(these),
            }
            rows.push(self.fields(fields, &inst_path)?);
        }
        let shape = shape.unwrap_or_else(|| vec![1, rows.len()]);
        Record::collection(shape, names.unwrap_or_default(), rows).map_err(|e| record_err(path, e))
    }

    fn fields(&mut self, fields: &Map<String, Json>, path: &str) -> SourceResult<Vec<Value>> {
        fields
            .iter()
            .map(|(k, v)| self.node(v, &format!("{path}.{k}")))
            .collect()
    }
}

fn number(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::Scalar(Scalar::UInt(u))
    } else {
        Value::from(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn shape(json: &Json, path: &str) -> SourceResult<Vec<usize>> {
    json.as_array()
        .ok_or_else(|| malformed(path, "\"shape\" must be a list of non-negative integers"))?
        .iter()
        .map(|d| {
            d.as_u64()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| malformed(path, "\"shape\" must be a list of non-negative integers"))
        })
        .collect()
}

fn array(spec: &Json, path: &str) -> SourceResult<NumericArray> {
    let dtype = spec.get("dtype").and_then(Json::as_str).unwrap_or("float64");
    let kind = ElementKind::parse(dtype).ok_or_else(|| malformed(path, &format!("unknown dtype \"{dtype}\"")))?;
    let data = spec
        .get("data")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed(path, "\"data\" must be a list"))?;
    let shape = match spec.get("shape") {
        Some(s) => shape(s, path)?,
        None => vec![data.len()],
    };

    let element = |i: usize| format!("{path}.data[{i}]");
    let built = match kind {
        ElementKind::Float64 => {
            let values = data
                .iter()
                .enumerate()
                .map(|(i, d)| float(d).ok_or_else(|| malformed(&element(i), "expected a number")))
                .collect::<SourceResult<Vec<_>>>()?;
            NumericArray::from_f64(&shape, values)
        }
        ElementKind::Int64 => {
            let values = data
                .iter()
                .enumerate()
                .map(|(i, d)| d.as_i64().ok_or_else(|| malformed(&element(i), "expected an integer")))
                .collect::<SourceResult<Vec<_>>>()?;
            NumericArray::from_i64(&shape, values)
        }
        ElementKind::UInt64 => {
            let values = data
                .iter()
                .enumerate()
                .map(|(i, d)| d.as_u64().ok_or_else(|| malformed(&element(i), "expected an unsigned integer")))
                .collect::<SourceResult<Vec<_>>>()?;
            NumericArray::from_u64(&shape, values)
        }
        ElementKind::Bool => {
            let values = data
                .iter()
                .enumerate()
                .map(|(i, d)| d.as_bool().ok_or_else(|| malformed(&element(i), "expected a boolean")))
                .collect::<SourceResult<Vec<_>>>()?;
            NumericArray::from_bool(&shape, values)
        }
    };
    built.map_err(|e| record_err(path, e))
}

fn float(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" | "nan" => Some(f64::NAN),
            "Infinity" | "inf" => Some(f64::INFINITY),
            "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn malformed(path: &str, message: &str) -> SourceError {
    SourceError::Malformed {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn record_err(path: &str, e: RecordError) -> SourceError {
    malformed(path, &e.to_string())
}
