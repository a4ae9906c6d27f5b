//! Foo resource handlers mounted under `/v1/foos`.
//!
//! Each handler decodes with the resource codec, calls the service, and
//! encodes the result. Bodies are taken as raw bytes so decode failures
//! come back as envelopes rather than axum's plain-text rejections.

use allsrv_core::resource::{
    self, foo_document, ErrorSource, FooCreateAttrs, FooUpdateAttrs, Meta, FOO_TYPE, STATUS_CREATED,
    STATUS_OK,
};
use allsrv_core::{Error, ErrorKind, Foo, FooUpdate, RequestContext};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;

use super::AppState;
use crate::network::response::{envelope, error_envelope, Ctx};

/// Encodes a service failure. Name collisions point at the name attribute.
fn failure(ctx: &RequestContext, err: &Error) -> Response {
    let errors = resource::to_response_errors(err)
        .into_iter()
        .map(|e| {
            if e.code == ErrorKind::Exists.code() {
                e.with_source(ErrorSource::pointer("/data/attributes/name"))
            } else {
                e
            }
        })
        .collect();
    error_envelope(Meta::from_context(ctx), errors)
}

fn found(ctx: &RequestContext, status: u16, foo: &Foo) -> Response {
    envelope(status, Meta::from_context(ctx), Some(foo_document(foo)), Vec::new())
}

/// `POST /v1/foos`
pub async fn create_foo(State(state): State<AppState>, Ctx(ctx): Ctx, body: Bytes) -> Response {
    let doc = match resource::decode::<FooCreateAttrs>(&body, FOO_TYPE) {
        Ok(doc) => doc,
        Err(err) => return error_envelope(Meta::from_context(&ctx), vec![err]),
    };
    let foo = Foo {
        name: doc.attributes.name,
        note: doc.attributes.note,
        ..Foo::default()
    };

    match state.svc.create_foo(&ctx, foo).await {
        Ok(created) => found(&ctx, STATUS_CREATED, &created),
        Err(err) => failure(&ctx, &err),
    }
}

/// `GET /v1/foos/{id}`
pub async fn read_foo(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    match state.svc.read_foo(&ctx, &id).await {
        Ok(foo) => found(&ctx, STATUS_OK, &foo),
        Err(err) => failure(&ctx, &err),
    }
}

/// `PATCH /v1/foos/{id}`
pub async fn update_foo(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let doc = match resource::decode_with_id::<FooUpdateAttrs>(&body, FOO_TYPE, &id) {
        Ok(doc) => doc,
        Err(err) => return error_envelope(Meta::from_context(&ctx), vec![err]),
    };
    let upd = FooUpdate {
        id: doc.id,
        name: doc.attributes.name,
        note: doc.attributes.note,
    };

    match state.svc.update_foo(&ctx, upd).await {
        Ok(updated) => found(&ctx, STATUS_OK, &updated),
        Err(err) => failure(&ctx, &err),
    }
}

/// `DELETE /v1/foos/{id}`
pub async fn delete_foo(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    match state.svc.delete_foo(&ctx, &id).await {
        Ok(()) => error_envelope(Meta::from_context(&ctx), Vec::new()),
        Err(err) => failure(&ctx, &err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::StatusCode;
    use axum::Router;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::network::middleware::{AllowAll, TRACE_ID_HEADER};
    use crate::network::{build_router, NetworkConfig};
    use crate::service::tests::stepping_service;
    use crate::telemetry::{Metrics, HTTP_ERRORS, HTTP_REQUESTS};

    fn app() -> (Router, AppState) {
        let state = AppState::new(Arc::new(stepping_service()), Metrics::shared());
        let router = build_router(state.clone(), Arc::new(AllowAll), &NetworkConfig::default());
        (router, state)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(router: &Router, req: Request) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn create_body(name: &str, note: &str) -> Value {
        json!({"data": {"type": "foo", "attributes": {"name": name, "note": note}}})
    }

    #[tokio::test]
    async fn create_then_read() {
        let (router, _) = app();

        let (status, json) = send(
            &router,
            json_request("POST", "/v1/foos", &create_body("first_foo", "first note")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["type"], "foo");
        assert_eq!(json["data"]["id"], "1");
        assert_eq!(json["data"]["attributes"]["name"], "first_foo");
        assert_eq!(json["data"]["attributes"]["note"], "first note");
        assert_eq!(json["data"]["attributes"]["created_at"], "0001-01-01T01:00:00Z");
        assert!(json.get("errors").is_none());
        assert!(json["meta"]["trace_id"].is_string());

        let (status, json) = send(&router, empty_request("GET", "/v1/foos/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["attributes"]["name"], "first_foo");
    }

    #[tokio::test]
    async fn name_collision_is_409_pointing_at_name() {
        let (router, _) = app();
        let body = create_body("existing-foo", "");
        send(&router, json_request("POST", "/v1/foos", &body)).await;

        let (status, json) = send(&router, json_request("POST", "/v1/foos", &body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["errors"][0]["status"], "409");
        assert_eq!(json["errors"][0]["code"], 1);
        assert_eq!(json["errors"][0]["source"]["pointer"], "/data/attributes/name");
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn empty_name_is_400() {
        let (router, _) = app();
        let (status, json) = send(
            &router,
            json_request("POST", "/v1/foos", &create_body("", "note")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["code"], 2);
    }

    #[tokio::test]
    async fn wrong_type_is_422() {
        let (router, _) = app();
        let body = json!({"data": {"type": "bar", "attributes": {"name": "x"}}});
        let (status, json) = send(&router, json_request("POST", "/v1/foos", &body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["errors"][0]["message"], "type must be foo");
        assert_eq!(json["errors"][0]["source"]["pointer"], "/data/type");
    }

    #[tokio::test]
    async fn malformed_body_is_400_at_data() {
        let (router, _) = app();
        let req = http::Request::post("/v1/foos")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, json) = send(&router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["source"]["pointer"], "/data");
        assert!(json["errors"][0]["message"]
            .as_str()
            .unwrap()
            .starts_with("failed to decode request body: "));
    }

    #[tokio::test]
    async fn read_missing_is_404() {
        let (router, _) = app();
        let (status, json) = send(&router, empty_request("GET", "/v1/foos/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errors"][0]["code"], 3);
        assert_eq!(json["errors"][0]["message"], "foo not found for id: nope");
    }

    #[tokio::test]
    async fn patch_updates_only_present_fields() {
        let (router, _) = app();
        send(
            &router,
            json_request("POST", "/v1/foos", &create_body("first_foo", "first note")),
        )
        .await;

        let body = json!({"data": {"type": "foo", "id": "1", "attributes": {"note": "second note"}}});
        let (status, json) = send(&router, json_request("PATCH", "/v1/foos/1", &body)).await;
        assert_eq!(status, StatusCode::OK);
        let attrs = &json["data"]["attributes"];
        assert_eq!(attrs["name"], "first_foo");
        assert_eq!(attrs["note"], "second note");
        assert_eq!(attrs["created_at"], "0001-01-01T01:00:00Z");
        assert_eq!(attrs["updated_at"], "0001-01-01T02:00:00Z");
    }

    #[tokio::test]
    async fn patch_with_mismatched_id_is_400() {
        let (router, _) = app();
        let body = json!({"data": {"type": "foo", "id": "2", "attributes": {"note": "x"}}});
        let (status, json) = send(&router, json_request("PATCH", "/v1/foos/1", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["source"]["pointer"], "/data/id");
    }

    #[tokio::test]
    async fn patch_missing_is_404() {
        let (router, _) = app();
        let body = json!({"data": {"type": "foo", "id": "1", "attributes": {"note": "x"}}});
        let (status, _) = send(&router, json_request("PATCH", "/v1/foos/1", &body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_read_is_404() {
        let (router, _) = app();
        send(&router, json_request("POST", "/v1/foos", &create_body("a", ""))).await;

        let (status, json) = send(&router, empty_request("DELETE", "/v1/foos/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("data").is_none());
        assert!(json.get("errors").is_none());
        assert!(json["meta"]["trace_id"].is_string());

        let (status, _) = send(&router, empty_request("DELETE", "/v1/foos/1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&router, empty_request("GET", "/v1/foos/1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_without_json_content_type_is_415() {
        let (router, _) = app();
        let req = http::Request::post("/v1/foos")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from(create_body("a", "").to_string()))
            .unwrap();
        let (status, json) = send(&router, req).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["errors"][0]["source"]["header"], "Content-Type");
    }

    #[tokio::test]
    async fn trace_id_round_trips_into_meta() {
        let (router, _) = app();
        let req = http::Request::get("/v1/foos/nope")
            .header(TRACE_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[TRACE_ID_HEADER], "abc-123");

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["meta"]["trace_id"], "abc-123");
    }

    #[tokio::test]
    async fn http_metrics_use_matched_route() {
        let (router, state) = app();
        send(&router, empty_request("GET", "/v1/foos/nope")).await;

        let text = state.metrics.render();
        assert!(text.contains(HTTP_REQUESTS));
        assert!(text.contains(HTTP_ERRORS));
        assert!(text.contains(r#"route="/v1/foos/{id}""#));
        assert!(!text.contains("nope"));

        let line_of = |name: &str| {
            text.lines()
                .find(|l| l.starts_with(&format!("{name}{{")))
                .unwrap()
                .to_string()
        };
        assert!(!line_of(HTTP_REQUESTS).contains("status="));
        assert!(line_of(HTTP_ERRORS).contains(r#"status="404""#));
    }

    proptest! {
        #[test]
        fn patched_attributes_come_back_verbatim(
            name in "\\PC{1,24}",
            note in "\\PC{0,48}",
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let attrs = rt.block_on(async {
                let (router, _) = app();
                send(&router, json_request("POST", "/v1/foos", &create_body("seed", ""))).await;

                let body = json!({"data": {
                    "type": "foo",
                    "id": "1",
                    "attributes": {"name": name.clone(), "note": note.clone()},
                }});
                let (status, json) = send(&router, json_request("PATCH", "/v1/foos/1", &body)).await;
                assert_eq!(status, StatusCode::OK);
                json["data"]["attributes"].clone()
            });
            prop_assert_eq!(attrs["name"].as_str(), Some(name.as_str()));
            prop_assert_eq!(attrs["note"].as_str(), Some(note.as_str()));
        }
    }
}
