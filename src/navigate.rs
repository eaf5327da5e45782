//! Field navigation: descend a record tree one field name at a time.
//!
//! Absence is an explicit [`NavigationError`] value carrying the failing
//! segment and the names that were available there. Navigation never
//! mutates its input and never returns a partial value.

use crate::error::NavigationError;
use crate::value::Value;

/// Walk `path` from `root`, returning the value reached.
///
/// Record collections are entered through their first instance, matching
/// the `[0, 0]` convention of single-struct variables. An empty path
/// returns the (resolved) root.
pub fn navigate<S: AsRef<str>>(root: &Value, path: &[S]) -> Result<Value, NavigationError> {
    if path.is_empty() {
        return root.resolve().map_err(|e| NavigationError::NotARecord {
            segment: String::new(),
            step: 0,
            path: String::new(),
            kind: root.type_name().to_string(),
            reason: e.to_string(),
        });
    }
    let mut current = root.clone();
    for step in 0..path.len() {
        current = step_into(&current, path, step)?;
    }
    Ok(current)
}

/// Take segment `step` of `path` from `current`, the value reached by the
/// segments before it. Errors carry the absolute step and the dotted path up
/// to it. A `step` past the end of `path` returns `current` unchanged.
pub fn step_into<S: AsRef<str>>(current: &Value, path: &[S], step: usize) -> Result<Value, NavigationError> {
    let Some(segment) = path.get(step).map(AsRef::as_ref) else {
        return Ok(current.clone());
    };
    let path_so_far = || {
        path[..=step]
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(".")
    };
    let not_a_record = |kind: &str, reason: String| NavigationError::NotARecord {
        segment: segment.to_string(),
        step,
        path: path_so_far(),
        kind: kind.to_string(),
        reason,
    };

    let here = current
        .resolve()
        .map_err(|e| not_a_record(current.type_name(), e.to_string()))?;
    let next = match &here {
        Value::Record(rec) if rec.instance_count() == 0 => {
            return Err(not_a_record(here.type_name(), "record collection has no instances".into()));
        }
        Value::Record(rec) => match rec.field(segment) {
            Some(v) => v.clone(),
            None => {
                return Err(NavigationError::NotFound {
                    segment: segment.to_string(),
                    step,
                    path: path_so_far(),
                    available: rec.field_names().to_vec(),
                });
            }
        },
        other => return Err(not_a_record(other.type_name(), "value has no named fields".into())),
    };
    let reached = next
        .resolve()
        .map_err(|e| not_a_record(next.type_name(), e.to_string()))?;
    tracing::trace!(step, segment, kind = reached.type_name(), "navigated");
    Ok(reached)
}

/// Split a dotted path (`"a.b.c"`) into segments, skipping empty ones.
pub fn split_path(dotted: &str) -> Vec<String> {
    dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::{Record, Scalar};

    fn tree() -> Value {
        let leaf = Record::single([("pos", Value::from(3.5))]).unwrap();
        let mid = Record::single([("m_value", Value::record(leaf)), ("other", Value::Null)]).unwrap();
        Value::record(Record::single([("m_listMemory", Value::record(mid))]).unwrap())
    }

    #[test]
    fn reaches_leaf_along_path() {
        let root = tree();
        let v = navigate(&root, &["m_listMemory", "m_value", "pos"]).unwrap();
        assert!(matches!(v, Value::Scalar(Scalar::Float(x)) if x == 3.5));
    }

    #[test]
    fn empty_path_returns_root() {
        let root = tree();
        let v = navigate::<&str>(&root, &[]).unwrap();
        assert_eq!(v.identity(), root.identity());
    }

    #[test]
    fn missing_field_reports_available_names() {
        let root = tree();
        let err = navigate(&root, &["m_listMemory", "missing"]).unwrap_err();
        match err {
            NavigationError::NotFound {
                segment,
                step,
                path,
                available,
            } => {
                assert_eq!(segment, "missing");
                assert_eq!(step, 1);
                assert_eq!(path, "m_listMemory.missing");
                assert_eq!(available, vec!["m_value".to_string(), "other".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn descending_into_a_scalar_fails() {
        let root = tree();
        let err = navigate(&root, &["m_listMemory", "m_value", "pos", "deeper"]).unwrap_err();
        assert!(matches!(err, NavigationError::NotARecord { step: 3, .. }));
    }

    #[test]
    fn empty_collection_cannot_be_entered() {
        let root = Value::record(Record::collection(vec![0, 1], vec!["a".into()], vec![]).unwrap());
        let err = navigate(&root, &["a"]).unwrap_err();
        assert!(matches!(err, NavigationError::NotARecord { step: 0, .. }));
    }

    #[test]
    fn collection_entered_through_first_instance() {
        let root = Value::record(
            Record::collection(
                vec![1, 2],
                vec!["a".into()],
                vec![vec![Value::from(1_i64)], vec![Value::from(2_i64)]],
            )
            .unwrap(),
        );
        let v = navigate(&root, &["a"]).unwrap();
        assert!(matches!(v, Value::Scalar(Scalar::Int(1))));
    }

    #[test]
    fn navigation_leaves_input_untouched() {
        let root = tree();
        let before = Arc::strong_count(match &root {
            Value::Record(r) => r,
            _ => unreachable!(),
        });
        let _ = navigate(&root, &["m_listMemory", "m_value"]).unwrap();
        let _ = navigate(&root, &["nope"]).unwrap_err();
        let after = Arc::strong_count(match &root {
            Value::Record(r) => r,
            _ => unreachable!(),
        });
        assert_eq!(before, after);
    }

    #[test]
    fn single_steps_report_absolute_positions() {
        let root = tree();
        let path = ["m_listMemory", "m_value", "missing"];
        let mid = step_into(&root, &path, 0).unwrap();
        let leaf = step_into(&mid, &path, 1).unwrap();
        let err = step_into(&leaf, &path, 2).unwrap_err();
        assert_eq!(err.step(), 2);
        assert!(matches!(
            err,
            NavigationError::NotFound { ref path, ref available, .. }
                if path == "m_listMemory.m_value.missing" && available == &vec!["pos".to_string()]
        ));
        assert_eq!(step_into(&leaf, &path, 9).unwrap().identity(), leaf.identity());
    }

    #[test]
    fn split_path_skips_empty_segments() {
        assert_eq!(split_path("a..b."), vec!["a", "b"]);
        assert!(split_path("").is_empty());
    }
}
