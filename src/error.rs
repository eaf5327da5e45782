//! Rich diagnostic error types for depslice.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Only whole-request failures surface as these types. Failures scoped to a
//! single field or element are embedded in the output tree as markers
//! (see [`crate::marker`]).

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for depslice.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum DepsliceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read source file: {path}")]
    #[diagnostic(
        code(depslice::source::io),
        help("Check that the source file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse source document: {message}")]
    #[diagnostic(
        code(depslice::source::parse),
        help("The source document must be valid JSON with a top-level \"variables\" object.")
    )]
    Parse { message: String },

    #[error("malformed node at {path}: {message}")]
    #[diagnostic(
        code(depslice::source::malformed),
        help(
            "Records use {{\"$record\": {{...}}}}, record collections use \
             {{\"$records\": [...], \"shape\": [...]}}, numeric arrays use \
             {{\"$array\": {{\"dtype\", \"shape\", \"data\"}}}}."
        )
    )]
    Malformed { path: String, message: String },

    #[error("unresolved reference \"{id}\" at {path}")]
    #[diagnostic(
        code(depslice::source::unresolved_ref),
        help(
            "A \"$ref\" must name a record declared with \"$id\" earlier in the \
             document or an enclosing record."
        )
    )]
    UnresolvedRef { id: String, path: String },

    #[error("root variable \"{name}\" not found in source")]
    #[diagnostic(
        code(depslice::source::missing_variable),
        help("Available variables: {available}. Set `root_variable` in the config file.")
    )]
    MissingVariable { name: String, available: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(depslice::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(depslice::config::parse),
        help("Check the TOML syntax in the config file: {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(depslice::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(depslice::config::invalid), help("Check the ExtractorConfig fields. {message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Record construction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RecordError {
    #[error("record shape {shape:?} holds {expected} instance(s), got {actual}")]
    #[diagnostic(
        code(depslice::record::shape_mismatch),
        help("The product of the record shape must equal the number of instances.")
    )]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("record shape {shape:?} overflows the addressable instance count")]
    #[diagnostic(
        code(depslice::record::shape_overflow),
        help("Record shape dimensions must multiply to a count that fits in memory.")
    )]
    ShapeOverflow { shape: Vec<usize> },

    #[error("record instance {index} has {found} value(s), expected {expected}")]
    #[diagnostic(
        code(depslice::record::field_mismatch),
        help("Every instance of a record collection must carry the same field names in the same order.")
    )]
    FieldMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate field name \"{name}\"")]
    #[diagnostic(code(depslice::record::duplicate_field), help("Field names within a record must be unique."))]
    DuplicateField { name: String },

    #[error("array shape {shape:?} does not match {len} element(s)")]
    #[diagnostic(
        code(depslice::record::array_shape),
        help("The product of the array shape must equal the number of data elements.")
    )]
    ArrayShape { shape: Vec<usize>, len: usize },
}

// ---------------------------------------------------------------------------
// Navigation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum NavigationError {
    #[error("field \"{segment}\" not found at step {step} of {path}")]
    #[diagnostic(
        code(depslice::navigate::not_found),
        help("Check the field names along the navigation path; `available` lists the fields present at the failing step.")
    )]
    NotFound {
        /// The path segment that could not be resolved.
        segment: String,
        /// Zero-based index of the failing segment.
        step: usize,
        /// Dotted path up to and including the failing segment.
        path: String,
        /// Field names present at the failing step (empty if not a record).
        available: Vec<String>,
    },

    #[error("cannot descend into {kind} at step {step} of {path}: {reason}")]
    #[diagnostic(
        code(depslice::navigate::not_a_record),
        help("Only single records and record collections with at least one instance can be navigated.")
    )]
    NotARecord {
        segment: String,
        step: usize,
        path: String,
        kind: String,
        reason: String,
    },
}

impl NavigationError {
    /// Index of the path segment where navigation stopped.
    pub fn step(&self) -> usize {
        match self {
            Self::NotFound { step, .. } | Self::NotARecord { step, .. } => *step,
        }
    }

    /// The path segment where navigation stopped.
    pub fn segment(&self) -> &str {
        match self {
            Self::NotFound { segment, .. } | Self::NotARecord { segment, .. } => segment,
        }
    }
}

// ---------------------------------------------------------------------------
// Range errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum RangeError {
    #[error("cycle {requested_cycle} out of range (max: {max_cycle})")]
    #[diagnostic(
        code(depslice::range::cycle),
        help("Valid cycle numbers run from 0 to the time-axis length minus one. Use `--cycles` to list them.")
    )]
    Cycle {
        requested_cycle: usize,
        max_cycle: usize,
        field_shape: Vec<usize>,
    },

    #[error("cycle {requested_cycle} requested from a field with an empty time axis")]
    #[diagnostic(code(depslice::range::empty_time_axis), help("The field carries no samples on its last axis."))]
    EmptyTimeAxis {
        requested_cycle: usize,
        field_shape: Vec<usize>,
    },
}

// ---------------------------------------------------------------------------
// Access errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum AccessError {
    #[error("back-reference target no longer exists")]
    #[diagnostic(
        code(depslice::access::dangling),
        help("The record this reference pointed to was dropped before the reference was read.")
    )]
    Dangling,
}

/// Convenience alias for functions returning depslice results.
pub type DepsliceResult<T> = std::result::Result<T, DepsliceError>;
