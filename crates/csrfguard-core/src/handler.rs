//! Error handlers
//!
//! A failed check is turned into a response by an [`ErrorHandler`]. The
//! returned future is awaited by the host binding, so handlers may do I/O
//! (render a template, log to a remote sink) without blocking a worker.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::request::Parts;
use http::{Response, StatusCode};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by error handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Response produced for a rejected request.
pub type ErrorResponse = Response<Full<Bytes>>;

/// Turns a verification failure into a rejection response.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Build the response for a request that failed CSRF verification.
    ///
    /// `reason` is a short human-readable description such as
    /// `"CSRF tokens did not match"`.
    fn handle(&self, parts: &Parts, reason: &str) -> BoxFuture<ErrorResponse>;
}

/// Default handler: `403 Forbidden` with the reason as a plain-text body.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForbiddenHandler;

impl ErrorHandler for ForbiddenHandler {
    fn handle(&self, _parts: &Parts, reason: &str) -> BoxFuture<ErrorResponse> {
        let body = Bytes::from(reason.to_string());
        Box::pin(async move {
            let mut response = Response::new(Full::new(body));
            *response.status_mut() = StatusCode::FORBIDDEN;
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        })
    }
}
