//! HTTP client implementing [`FooService`] against a remote allsrv server.
//!
//! Wire errors are mapped back into the error taxonomy, so a caller sees the
//! same kinds it would get from an in-process [`crate::CoreService`].

use std::time::Duration;

use allsrv_core::resource::{self, FooAttrs, ResponseBody, ResponseError};
use allsrv_core::{Error, Foo, FooUpdate, RequestContext, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::Serialize;
use tracing::debug;

use crate::network::response::JSON_CONTENT_TYPE;
use crate::network::TRACE_ID_HEADER;
use crate::traits::FooService;

/// Remote [`FooService`] over HTTP.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("basic_auth", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client for the server at `base_url` (e.g. `http://localhost:8091`).
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the HTTP client cannot be initialized.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::internal_from("failed to build http client", e))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            credentials: None,
        })
    }

    /// Joins `segments` onto the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::internal_from("invalid server address", e))?;
        url.path_segments_mut()
            .map_err(|()| {
                Error::internal("invalid server address")
                    .with_field("addr", self.base_url.as_str())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends HTTP basic auth with every request.
    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), pass.into()));
        self
    }

    async fn send<B: Serialize>(
        &self,
        ctx: &RequestContext,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Option<Foo>> {
        ctx.check()?;

        let url = self.url(segments)?;
        let mut req = self.http.request(method.clone(), url.clone());
        if !ctx.trace_id.is_empty() {
            req = req.header(TRACE_ID_HEADER, ctx.trace_id.as_str());
        }
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, Some(pass));
        }
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| Error::internal_from("failed to encode request body", e))?;
            req = req.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(bytes);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::internal_from("failed to send request", e))?;
        let status = resp.status().as_u16();
        debug!(%method, %url, status, "allsrv response");

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(JSON_CONTENT_TYPE) {
            return Err(Error::internal("received non-JSON response")
                .with_field("status", status)
                .with_field("content_type", content_type));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::internal_from("failed to read response body", e))?;
        let decoded: ResponseBody<FooAttrs> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::internal_from("failed to decode response body", e))?;

        if let Some(err) = errors_to_error(&decoded.errors) {
            return Err(err.with_field("status", status));
        }
        Ok(decoded.data.map(Foo::from))
    }
}

/// Joins wire errors into one taxonomy error, `None` when there are none.
fn errors_to_error(errors: &[ResponseError]) -> Option<Error> {
    Error::join(errors.iter().map(resource::to_error).collect())
}

fn missing_data() -> Error {
    Error::internal("response carried no foo")
}

const FOOS: [&str; 2] = ["v1", "foos"];

/// Path segments of one foo. An empty id would address the collection, so it
/// is rejected here the way the in-process service rejects it.
fn foo_segments(id: &str) -> Result<[&str; 3]> {
    if id.is_empty() {
        return Err(Error::invalid("foo id is required"));
    }
    Ok(["v1", "foos", id])
}

#[async_trait]
impl FooService for HttpClient {
    async fn create_foo(&self, ctx: &RequestContext, foo: Foo) -> Result<Foo> {
        let body = resource::create_request(&foo);
        self.send(ctx, Method::POST, &FOOS, Some(&body))
            .await?
            .ok_or_else(missing_data)
    }

    async fn read_foo(&self, ctx: &RequestContext, id: &str) -> Result<Foo> {
        self.send::<()>(ctx, Method::GET, &foo_segments(id)?, None)
            .await?
            .ok_or_else(missing_data)
    }

    async fn update_foo(&self, ctx: &RequestContext, upd: FooUpdate) -> Result<Foo> {
        let body = resource::update_request(&upd);
        self.send(ctx, Method::PATCH, &foo_segments(&upd.id)?, Some(&body))
            .await?
            .ok_or_else(missing_data)
    }

    async fn delete_foo(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.send::<()>(ctx, Method::DELETE, &foo_segments(id)?, None)
            .await?;
        Ok(())
    }
}
