//! Envelope responses and the request-context extractor used by handlers
//! and middleware alike.

use std::convert::Infallible;

use allsrv_core::resource::{self, Document, Meta, ResponseError, STATUS_OK};
use allsrv_core::RequestContext;
use axum::extract::FromRequestParts;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Encodes a response envelope. The status is chosen by the codec.
pub fn envelope<A: Serialize>(
    success_status: u16,
    meta: Meta,
    data: Option<Document<A>>,
    errors: Vec<ResponseError>,
) -> Response {
    let (status, body) = match resource::encode(success_status, meta.clone(), data, errors) {
        Ok(encoded) => encoded,
        Err(err) => {
            error!(err = %err, trace_id = %meta.trace_id, "failed to encode response body");
            let internal = ResponseError::new(
                resource::STATUS_INTERNAL_SERVER_ERROR,
                allsrv_core::ErrorKind::Internal,
                "failed to encode response",
            );
            resource::encode::<()>(STATUS_OK, meta, None, vec![internal])
                .unwrap_or((resource::STATUS_INTERNAL_SERVER_ERROR, Vec::new()))
        }
    };
    json_response(status, body)
}

/// An envelope carrying only errors.
pub fn error_envelope(meta: Meta, errors: Vec<ResponseError>) -> Response {
    envelope::<()>(STATUS_OK, meta, None, errors)
}

fn json_response(status: u16, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = (status, body).into_response();
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    resp
}

/// Extracts the [`RequestContext`] placed in extensions by the trace-id
/// stage. Outside the pipeline a fresh context with a new trace id is used.
#[derive(Debug, Clone)]
pub struct Ctx(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Ctx {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::new(uuid::Uuid::new_v4().to_string()));
        Ok(Self(ctx))
    }
}
