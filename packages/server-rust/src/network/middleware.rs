//! HTTP request pipeline for the allsrv server.
//!
//! Builds the Tower middleware stack applied to the foo API routes.
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).
//!
//! Every stage that short-circuits builds its response through the
//! resource codec, so clients see the same envelope no matter where a
//! request was rejected.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use allsrv_core::resource::{to_response_error, ErrorSource, Meta, ResponseError};
use allsrv_core::{Error, ErrorKind, RequestContext};
use axum::extract::{MatchedPath, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, ORIGIN, USER_AGENT, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use base64::prelude::*;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use subtle::ConstantTimeEq;
use tower::layer::util::{Identity, Stack};
use tower::{Layer, Service, ServiceBuilder};
use tracing::{error, info_span, warn, Instrument};

use super::response::error_envelope;
use super::shutdown::ShutdownController;
use crate::telemetry::{
    SharedMetrics, HTTP_DURATION, HTTP_ERRORS, HTTP_REQUESTS, HTTP_UNAUTHORIZED,
};

/// Caller-supplied (or generated) trace id header.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-mess-trace-id");

/// The composed Tower layer type produced by [`build_pipeline`].
///
/// Each layer wraps the next in a `Stack`, from outermost (first applied)
/// to innermost (last applied).
pub type PipelineLayers = Stack<
    RecoverLayer,
    Stack<
        ContentTypeLayer,
        Stack<HttpObserveLayer, Stack<StartTimeLayer, Stack<TraceIdLayer, Stack<AuthLayer, Identity>>>>,
    >,
>;

/// Builds the request pipeline for the foo API routes.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `Auth` -- rejects unauthenticated callers with 401
/// 2. `TraceId` -- creates the request's [`RequestContext`] and echoes `X-Mess-Trace-Id`
/// 3. `StartTime` -- stamps the context's start time, the base of `meta.took_ms`
/// 4. `HttpObserve` -- request/error counters, duration histogram, `http_request` span
/// 5. `ContentType` -- requires `application/json` bodies on POST, PUT, PATCH
/// 6. `Recover` -- turns handler panics into 500 envelopes
#[must_use]
pub fn build_pipeline(
    authenticator: Arc<dyn Authenticator>,
    metrics: SharedMetrics,
    request_timeout: Duration,
) -> PipelineLayers {
    ServiceBuilder::new()
        .layer(AuthLayer::new(authenticator, metrics.clone()))
        .layer(TraceIdLayer::new(request_timeout))
        .layer(StartTimeLayer)
        .layer(HttpObserveLayer::new(metrics))
        .layer(ContentTypeLayer)
        .layer(RecoverLayer)
        .into_inner()
}

fn meta_for(req: &Request) -> Meta {
    req.extensions()
        .get::<RequestContext>()
        .map(Meta::from_context)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Decides whether a request may proceed, from its headers alone.
pub trait Authenticator: Send + Sync {
    /// # Errors
    ///
    /// Returns an `Unauthorized` error when the caller is rejected.
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), Error>;
}

/// Lets every request through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<(), Error> {
        Ok(())
    }
}

/// HTTP Basic auth against one static credential pair.
#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    pass: String,
}

impl BasicAuth {
    #[must_use]
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

fn unauthorized(reason: &'static str) -> Error {
    Error::unauthorized("unauthorized access").with_field("reason", reason)
}

fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Error> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("authorization header is not ascii"))?;
    let (scheme, encoded) = value
        .split_once(' ')
        .ok_or_else(|| unauthorized("malformed authorization header"))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(unauthorized("authorization scheme is not basic"));
    }
    let decoded = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|_| unauthorized("basic credentials are not base64"))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| unauthorized("basic credentials are not utf-8"))?;
    let (user, pass) = decoded
        .split_once(':')
        .ok_or_else(|| unauthorized("basic credentials lack a separator"))?;
    Ok((user.to_string(), pass.to_string()))
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), Error> {
        let (user, pass) = basic_credentials(headers)?;
        let user_ok = user.as_bytes().ct_eq(self.user.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.pass.as_bytes());
        if bool::from(user_ok & pass_ok) {
            Ok(())
        } else {
            Err(unauthorized("invalid credentials").with_field("user", user))
        }
    }
}

/// Tower layer running an [`Authenticator`] before anything else.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<dyn Authenticator>,
    metrics: SharedMetrics,
}

impl AuthLayer {
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>, metrics: SharedMetrics) -> Self {
        Self {
            authenticator,
            metrics,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: Arc::clone(&self.authenticator),
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<dyn Authenticator>,
    metrics: SharedMetrics,
}

impl<S> Service<Request> for AuthService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        match self.authenticator.authenticate(req.headers()) {
            Ok(()) => Box::pin(self.inner.call(req)),
            Err(err) => {
                // The context does not exist yet; echo a caller trace id if one came in.
                let trace_id = header_str(req.headers(), &TRACE_ID_HEADER).to_string();
                warn!(
                    method = %req.method(),
                    path = %req.uri().path(),
                    trace_id = %trace_id,
                    err_fields = %err.fields_json(),
                    "unauthorized request"
                );
                self.metrics.increment(HTTP_UNAUTHORIZED, &[]);

                let resp_err = to_response_error(&err).with_source(ErrorSource::header("Authorization"));
                let meta = Meta {
                    took_ms: 0,
                    trace_id,
                };
                let mut resp = error_envelope(meta, vec![resp_err]);
                resp.headers_mut().insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Basic realm="allsrv""#),
                );
                Box::pin(async move { Ok(resp) })
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Trace id
// ---------------------------------------------------------------------------

/// Tower layer creating the request's [`RequestContext`].
#[derive(Debug, Clone)]
pub struct TraceIdLayer {
    request_timeout: Duration,
}

impl TraceIdLayer {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdService {
            inner,
            request_timeout: self.request_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceIdService<S> {
    inner: S,
    request_timeout: Duration,
}

impl<S> Service<Request> for TraceIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let headers = req.headers();
        let trace_id = match header_str(headers, &TRACE_ID_HEADER) {
            "" => uuid::Uuid::new_v4().to_string(),
            supplied => supplied.to_string(),
        };
        let mut ctx = RequestContext::new(trace_id.clone()).with_timeout(self.request_timeout);
        ctx.origin = header_str(headers, &ORIGIN).to_string();
        ctx.user_agent = header_str(headers, &USER_AGENT).to_string();

        // Dropping the response future (client went away) cancels the context.
        let cancel_on_drop = ctx.cancellation_token().clone().drop_guard();
        req.extensions_mut().insert(ctx);

        let fut = self.inner.call(req);
        Box::pin(async move {
            let mut resp = fut.await?;
            let _ = cancel_on_drop.disarm();
            if let Ok(value) = HeaderValue::from_str(&trace_id) {
                resp.headers_mut().insert(TRACE_ID_HEADER, value);
            }
            Ok(resp)
        })
    }
}

// ---------------------------------------------------------------------------
// Start time
// ---------------------------------------------------------------------------

/// Tower layer stamping `RequestContext::started_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartTimeLayer;

impl<S> Layer<S> for StartTimeLayer {
    type Service = StartTimeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StartTimeService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct StartTimeService<S> {
    inner: S,
}

impl<S> Service<Request> for StartTimeService<S>
where
    S: Service<Request, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
            ctx.started_at = Instant::now();
        }
        self.inner.call(req)
    }
}

// ---------------------------------------------------------------------------
// HTTP metrics and tracing
// ---------------------------------------------------------------------------

/// Tower layer recording per-route request metrics inside an `http_request` span.
#[derive(Debug, Clone)]
pub struct HttpObserveLayer {
    metrics: SharedMetrics,
}

impl HttpObserveLayer {
    #[must_use]
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for HttpObserveLayer {
    type Service = HttpObserveService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpObserveService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpObserveService<S> {
    inner: S,
    metrics: SharedMetrics,
}

impl<S> Service<Request> for HttpObserveService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().to_string();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
        let trace_id = req
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.trace_id.clone())
            .unwrap_or_default();

        let span = info_span!(
            "http_request",
            method = %method,
            route = %route,
            trace_id = %trace_id,
            status = tracing::field::Empty,
        );
        let metrics = self.metrics.clone();
        let start = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let result = fut.await;
                // Errors from the inner service never reach here for axum routes (Infallible).
                let status = result.as_ref().map_or(500, |resp| resp.status().as_u16());
                tracing::Span::current().record("status", status);

                // Requests are counted per route; outcomes also carry the status.
                let failed = status > 299;
                let status = status.to_string();
                let labels = [("method", method.as_str()), ("route", route.as_str())];
                let with_status = [labels[0], labels[1], ("status", status.as_str())];
                metrics.increment(HTTP_REQUESTS, &labels);
                if failed {
                    metrics.increment(HTTP_ERRORS, &with_status);
                }
                metrics.record_duration(HTTP_DURATION, &with_status, start.elapsed());
                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Content type
// ---------------------------------------------------------------------------

/// Tower layer rejecting body-bearing requests that are not JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeLayer;

impl<S> Layer<S> for ContentTypeLayer {
    type Service = ContentTypeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContentTypeService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ContentTypeService<S> {
    inner: S,
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// True when the media type is `application/json`, ignoring parameters.
fn is_json(headers: &HeaderMap) -> bool {
    let value = header_str(headers, &CONTENT_TYPE);
    let essence = value.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(super::response::JSON_CONTENT_TYPE)
}

impl<S> Service<Request> for ContentTypeService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if carries_body(req.method()) && !is_json(req.headers()) {
            let err = ResponseError::new(
                allsrv_core::resource::STATUS_UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::Invalid,
                "received invalid media type",
            )
            .with_source(ErrorSource::header("Content-Type"));
            let resp = error_envelope(meta_for(&req), vec![err]);
            return Box::pin(async move { Ok(resp) });
        }
        Box::pin(self.inner.call(req))
    }
}

// ---------------------------------------------------------------------------
// Panic recovery
// ---------------------------------------------------------------------------

/// Panic payload that [`RecoverLayer`] refuses to recover.
///
/// Panicking with it (see [`abort_request`]) unwinds past the pipeline so
/// the transport drops the connection without writing a response.
#[derive(Debug, Clone, Copy)]
pub struct AbortRequest;

/// Aborts the current request by unwinding with [`AbortRequest`].
pub fn abort_request() -> ! {
    std::panic::panic_any(AbortRequest)
}

/// Tower layer converting handler panics into 500 envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverLayer;

impl<S> Layer<S> for RecoverLayer {
    type Service = RecoverService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoverService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RecoverService<S> {
    inner: S,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

fn recovered(payload: Box<dyn Any + Send>, ctx: Option<RequestContext>) -> Response {
    if payload.is::<AbortRequest>() {
        std::panic::resume_unwind(payload);
    }
    let trace_id = ctx.as_ref().map(|c| c.trace_id.as_str()).unwrap_or_default();
    error!(trace_id = %trace_id, panic = %panic_message(payload.as_ref()), "recovered from panic");

    let err = to_response_error(&Error::internal("internal server error"));
    let meta = ctx.as_ref().map(Meta::from_context).unwrap_or_default();
    error_envelope(meta, vec![err])
}

impl<S> Service<Request> for RecoverService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let ctx = req.extensions().get::<RequestContext>().cloned();
        let inner = &mut self.inner;
        match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(req))) {
            Ok(fut) => Box::pin(async move {
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Ok(recovered(payload, ctx)),
                }
            }),
            Err(payload) => {
                let resp = recovered(payload, ctx);
                Box::pin(async move { Ok(resp) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

/// Tower layer holding an in-flight guard for the life of each request.
#[derive(Debug, Clone)]
pub struct InFlightLayer {
    shutdown: Arc<ShutdownController>,
}

impl InFlightLayer {
    #[must_use]
    pub fn new(shutdown: Arc<ShutdownController>) -> Self {
        Self { shutdown }
    }
}

impl<S> Layer<S> for InFlightLayer {
    type Service = InFlightService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InFlightService {
            inner,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InFlightService<S> {
    inner: S,
    shutdown: Arc<ShutdownController>,
}

impl<S> Service<Request> for InFlightService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let guard = self.shutdown.in_flight_guard();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let resp = fut.await;
            drop(guard);
            resp
        })
    }
}
