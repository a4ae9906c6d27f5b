//! Error taxonomy shared by every layer of the service.
//!
//! [`Error`] is a lightly structured error: a closed [`ErrorKind`], a
//! human-readable message, and ordered key/value fields for diagnostics.
//! Fields enrich logs without blowing up message cardinality and never take
//! part in classification.
//!
//! Classification survives wrapping: [`kind_of`] walks the
//! [`std::error::Error::source`] chain, so an outer layer that wraps an
//! [`Error`] (for example with `anyhow::Context`) keeps its kind visible.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A resource with conflicting identity already exists.
    Exists,
    /// The caller supplied invalid input.
    Invalid,
    /// The requested resource does not exist.
    NotFound,
    /// The caller is not authorized.
    Unauthorized,
    /// Anything unexpected. The default for unclassified failures.
    Internal,
}

impl ErrorKind {
    /// Stable numeric code exposed on the wire.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Exists => 1,
            Self::Invalid => 2,
            Self::NotFound => 3,
            Self::Unauthorized => 4,
            Self::Internal => 5,
        }
    }

    /// Inverse of [`ErrorKind::code`]. Unknown codes classify as `Internal`.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Exists,
            2 => Self::Invalid,
            3 => Self::NotFound,
            4 => Self::Unauthorized,
            _ => Self::Internal,
        }
    }

    /// Returns the lowercase name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered diagnostic fields attached to an [`Error`].
pub type Fields = Vec<(String, Value)>;

type Source = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error carried from the point of failure to the resource codec.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    fields: Fields,
    joined: Vec<Error>,
    #[source]
    source: Option<Source>,
}

/// Result alias used throughout the service.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
            joined: Vec::new(),
            source: None,
        }
    }

    #[must_use]
    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exists, message)
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Creates an internal error that keeps `source` for diagnostics.
    ///
    /// The source's text lands in the `cause` field, never in the message,
    /// so driver details cannot leak onto the wire.
    #[must_use]
    pub fn internal_from<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let cause = source.to_string();
        let mut err = Self::internal(message).with_field("cause", cause);
        err.source = Some(Arc::new(source));
        err
    }

    /// Aggregates several errors into one.
    ///
    /// The aggregate takes the kind of its first member. A single error is
    /// returned as is. Returns `None` when `errors` is empty.
    #[must_use]
    pub fn join(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => {
                let message = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                let mut err = Self::new(errors[0].kind, message);
                err.joined = errors;
                Some(err)
            }
        }
    }

    /// Appends a diagnostic field. Existing fields are kept in order.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Members of an aggregate built by [`Error::join`]; empty otherwise.
    #[must_use]
    pub fn joined(&self) -> &[Error] {
        &self.joined
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Renders the fields as a JSON object for log output.
    #[must_use]
    pub fn fields_json(&self) -> String {
        let map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map).to_string()
    }
}

/// Returns the kind of the first [`Error`] found in `err`'s source chain.
#[must_use]
pub fn kind_of(err: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<Error>() {
            return Some(found.kind);
        }
        current = e.source();
    }
    None
}

/// Reports whether `err`, or anything it wraps, is an [`Error`] of `kind`.
#[must_use]
pub fn is_kind(err: &(dyn std::error::Error + 'static), kind: ErrorKind) -> bool {
    kind_of(err) == Some(kind)
}
