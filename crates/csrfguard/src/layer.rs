use crate::body::{boxed, peek_body, BoxBody, BoxError};
use bytes::Bytes;
use csrfguard_core::{Csrf, Mode, Session, Verdict};
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer applying CSRF protection.
///
/// Requests that fail verification never reach the wrapped service; the
/// engine's error handler answers them instead.
#[derive(Clone, Debug)]
pub struct CsrfLayer {
    csrf: Csrf,
    mode: Mode,
}

impl CsrfLayer {
    /// Protect requests according to the configured policy.
    pub fn new(csrf: Csrf) -> Self {
        Self::with_mode(csrf, Mode::Filter)
    }

    /// Never verify, only make sure every request carries a token.
    pub fn add_token(csrf: Csrf) -> Self {
        Self::with_mode(csrf, Mode::AddToken)
    }

    /// Verify regardless of method and content type.
    pub fn check(csrf: Csrf) -> Self {
        Self::with_mode(csrf, Mode::Check)
    }

    /// Create a layer with an explicit mode.
    pub fn with_mode(csrf: Csrf, mode: Mode) -> Self {
        Self { csrf, mode }
    }

    /// The verification mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            csrf: self.csrf.clone(),
            mode: self.mode,
        }
    }
}

/// Service created by [`CsrfLayer`].
#[derive(Clone, Debug)]
pub struct CsrfService<S> {
    inner: S,
    csrf: Csrf,
    mode: Mode,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CsrfService<S>
where
    S: Service<Request<BoxBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<BoxBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // the ready service goes into the future, a fresh clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let csrf = self.csrf.clone();
        let mode = self.mode;

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let body = boxed(body);

            let (outcome, body) = match csrf.begin_with(&parts, mode) {
                Verdict::Passed(passed) => (Ok(passed), body),
                Verdict::Failed(failure) => (Err(failure), body),
                Verdict::Checking(check) => {
                    let peeked = peek_body(body, csrf.config().post_body_buffer).await;
                    let outcome = check.finish(&csrf, &parts, &peeked.prefix, peeked.complete);
                    (outcome, peeked.body)
                }
            };

            let passed = match outcome {
                Ok(passed) => passed,
                Err(failure) => {
                    let response = csrf.reject(&parts, &failure).await;
                    return Ok(response.map(boxed));
                }
            };

            if let Some(token) = passed.token() {
                csrf.store().stamp(&mut parts.extensions, token.clone());
            }
            let session = parts.extensions.get::<Session>().cloned();

            let fut: BoxFuture<'static, Result<Response<ResBody>, S::Error>> =
                Box::pin(inner.call(Request::from_parts(parts, body)));
            let mut response = fut.await?.map(boxed);
            csrf.attach(&passed, response.headers_mut(), session.as_ref());

            Ok(response)
        })
    }
}
