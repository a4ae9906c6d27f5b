//! Resource codec: the wire contract shared by the server and the client.
//!
//! Every payload travels inside a uniform envelope:
//!
//! - requests carry `{"data": Document<A>}`
//! - responses carry `{"meta": Meta, "errors": [...], "data": Document<A>?}`
//!
//! where `A` is the attribute shape of the operation (create, update, read).
//! Decoding enforces the resource type before anything reaches business
//! logic, and this module is the only place an [`ErrorKind`] becomes an HTTP
//! status.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::context::RequestContext;
use crate::error::{Error, ErrorKind};
use crate::foo::{Foo, FooUpdate};

/// Resource type discriminator for foos.
pub const FOO_TYPE: &str = "foo";

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_UNSUPPORTED_MEDIA_TYPE: u16 = 415;
pub const STATUS_UNPROCESSABLE_ENTITY: u16 = 422;
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

// ---------------------------------------------------------------------------
// Envelope types
// ---------------------------------------------------------------------------

/// A single resource: type discriminator, id, and typed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document<A> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub attributes: A,
}

impl<A> Document<A> {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: A) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes,
        }
    }
}

/// Request body wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody<A> {
    pub data: Document<A>,
}

/// Response body wrapper. `data` and a non-empty `errors` never coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody<A> {
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<Document<A>>,
}

/// Non-standard context attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub took_ms: u64,
    pub trace_id: String,
}

impl Meta {
    /// Meta for a response produced under `ctx`, timed from `ctx.started_at`.
    #[must_use]
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            took_ms: u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
            trace_id: ctx.trace_id.clone(),
        }
    }
}

/// Wire error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(with = "status_string")]
    pub status: u16,
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

impl ResponseError {
    #[must_use]
    pub fn new(status: u16, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            code: kind.code(),
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Locates the part of the request an error refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl ErrorSource {
    /// JSON pointer into the request body, e.g. `/data/attributes/name`.
    #[must_use]
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            parameter: Some(parameter.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn header(header: impl Into<String>) -> Self {
        Self {
            header: Some(header.into()),
            ..Self::default()
        }
    }
}

/// The status travels as a string, e.g. `"409"`.
mod status_string {
    use super::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(status)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Foo attribute shapes
// ---------------------------------------------------------------------------

/// Attributes accepted by the create endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooCreateAttrs {
    pub name: String,
    #[serde(default)]
    pub note: String,
}

/// Attributes accepted by the update endpoint. Omitted fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooUpdateAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Attributes returned for a stored foo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooAttrs {
    pub name: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Builds the read document for `foo`.
#[must_use]
pub fn foo_document(foo: &Foo) -> Document<FooAttrs> {
    Document::new(
        FOO_TYPE,
        foo.id.clone(),
        FooAttrs {
            name: foo.name.clone(),
            note: foo.note.clone(),
            created_at: foo.created_at,
            updated_at: foo.updated_at,
        },
    )
}

impl From<Document<FooAttrs>> for Foo {
    fn from(doc: Document<FooAttrs>) -> Self {
        Self {
            id: doc.id,
            name: doc.attributes.name,
            note: doc.attributes.note,
            created_at: doc.attributes.created_at,
            updated_at: doc.attributes.updated_at,
        }
    }
}

/// Builds the create request body for `foo`. Only name and note travel.
#[must_use]
pub fn create_request(foo: &Foo) -> RequestBody<FooCreateAttrs> {
    RequestBody {
        data: Document::new(
            FOO_TYPE,
            String::new(),
            FooCreateAttrs {
                name: foo.name.clone(),
                note: foo.note.clone(),
            },
        ),
    }
}

/// Builds the update request body for `upd`.
#[must_use]
pub fn update_request(upd: &FooUpdate) -> RequestBody<FooUpdateAttrs> {
    RequestBody {
        data: Document::new(
            FOO_TYPE,
            upd.id.clone(),
            FooUpdateAttrs {
                name: upd.name.clone(),
                note: upd.note.clone(),
            },
        ),
    }
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Parses a request envelope and checks its resource type.
///
/// # Errors
///
/// - 400 / `Invalid` at `/data` when the body is not a valid envelope.
/// - 422 / `Invalid` at `/data/type` when the type is not `expected_type`.
pub fn decode<A: DeserializeOwned>(
    body: &[u8],
    expected_type: &str,
) -> Result<Document<A>, ResponseError> {
    let req: RequestBody<A> = serde_json::from_slice(body).map_err(|err| {
        ResponseError::new(
            STATUS_BAD_REQUEST,
            ErrorKind::Invalid,
            format!("failed to decode request body: {err}"),
        )
        .with_source(ErrorSource::pointer("/data"))
    })?;

    if req.data.kind != expected_type {
        return Err(ResponseError::new(
            STATUS_UNPROCESSABLE_ENTITY,
            ErrorKind::Invalid,
            format!("type must be {expected_type}"),
        )
        .with_source(ErrorSource::pointer("/data/type")));
    }

    Ok(req.data)
}

/// Like [`decode`], and additionally requires the body id to equal `path_id`.
///
/// # Errors
///
/// Everything [`decode`] returns, plus 400 / `Invalid` at `/data/id` on an id mismatch.
pub fn decode_with_id<A: DeserializeOwned>(
    body: &[u8],
    expected_type: &str,
    path_id: &str,
) -> Result<Document<A>, ResponseError> {
    let doc = decode::<A>(body, expected_type)?;
    if doc.id != path_id {
        return Err(ResponseError::new(
            STATUS_BAD_REQUEST,
            ErrorKind::Invalid,
            "id in body does not match id in path",
        )
        .with_source(ErrorSource::pointer("/data/id")));
    }
    Ok(doc)
}

/// Serializes a response envelope and picks its status.
///
/// The status is the largest of `success_status` and every error status.
/// When `errors` is non-empty, `data` is dropped.
///
/// # Errors
///
/// Returns the serializer error if the attributes cannot be encoded.
pub fn encode<A: Serialize>(
    success_status: u16,
    meta: Meta,
    data: Option<Document<A>>,
    errors: Vec<ResponseError>,
) -> Result<(u16, Vec<u8>), serde_json::Error> {
    let status = errors
        .iter()
        .map(|e| e.status)
        .fold(success_status, u16::max);
    let data = if errors.is_empty() { data } else { None };
    let body = ResponseBody { meta, errors, data };
    Ok((status, serde_json::to_vec(&body)?))
}

/// HTTP status for an error kind.
#[must_use]
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Exists => STATUS_CONFLICT,
        ErrorKind::Invalid => STATUS_BAD_REQUEST,
        ErrorKind::NotFound => STATUS_NOT_FOUND,
        ErrorKind::Unauthorized => STATUS_UNAUTHORIZED,
        ErrorKind::Internal => STATUS_INTERNAL_SERVER_ERROR,
    }
}

/// Maps one error to its wire object. Fields stay behind; they belong in logs.
#[must_use]
pub fn to_response_error(err: &Error) -> ResponseError {
    ResponseError::new(status_for(err.kind()), err.kind(), err.message())
}

/// Maps an error to wire objects, flattening aggregates.
#[must_use]
pub fn to_response_errors(err: &Error) -> Vec<ResponseError> {
    if err.joined().is_empty() {
        return vec![to_response_error(err)];
    }
    err.joined().iter().flat_map(to_response_errors).collect()
}

/// Rebuilds a taxonomy error from a wire object.
#[must_use]
pub fn to_error(resp: &ResponseError) -> Error {
    let err = Error::new(ErrorKind::from_code(resp.code), resp.message.clone());
    match &resp.source {
        Some(source) => match serde_json::to_value(source) {
            Ok(value) => err.with_field("err_source", value),
            Err(_) => err,
        },
        None => err,
    }
}
