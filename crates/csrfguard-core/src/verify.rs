//! Per-request verification state machine
//!
//! ```text
//! Unchecked ──(policy: no check)──────────────────────────────▶ Passed
//!     │
//!     └─(policy: check)─▶ Checking ──(tokens match)───────────▶ Passed
//!                            │    └─(missing / mismatched)────▶ Failed
//!                            └─(form body needed)─▶ BodyCheck::finish
//! ```
//!
//! [`Csrf::begin`](crate::Csrf::begin) runs everything that only needs the
//! request head. When the token may be in a form body, it returns
//! [`Verdict::Checking`] and the host binding feeds a bounded body prefix to
//! [`BodyCheck::finish`].

use crate::body::FormKind;
use crate::engine::Csrf;
use crate::token::CsrfToken;
use http::request::Parts;
use std::fmt;

/// Which checks a protected route applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Full policy: method and content-type lists, header rules, route
    /// modifiers and CORS trust
    #[default]
    Filter,
    /// Always verify unless the request is CORS-trusted or exempt by route
    Check,
    /// Never verify, always make sure a token exists
    AddToken,
}

/// States of a single verification.
///
/// A request is `Unchecked` until [`Csrf::begin`](crate::Csrf::begin) runs;
/// a [`Verdict`] is always in one of the later states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum State {
    /// Before `begin`, nothing decided yet
    #[default]
    Unchecked,
    /// A token must be verified and the body is still needed
    Checking,
    /// The request may proceed
    Passed,
    /// The request is rejected
    Failed,
}

/// Outcome of [`Csrf::begin`](crate::Csrf::begin).
#[derive(Debug)]
pub enum Verdict {
    /// The request may proceed.
    Passed(Passed),
    /// The presented token has to come from the form body.
    Checking(BodyCheck),
    /// The request is rejected.
    Failed(Failure),
}

impl Verdict {
    /// The state this verdict represents.
    pub fn state(&self) -> State {
        match self {
            Verdict::Passed(_) => State::Passed,
            Verdict::Checking(_) => State::Checking,
            Verdict::Failed(_) => State::Failed,
        }
    }
}

impl From<Result<Passed, Failure>> for Verdict {
    fn from(result: Result<Passed, Failure>) -> Self {
        match result {
            Ok(passed) => Verdict::Passed(passed),
            Err(failure) => Verdict::Failed(failure),
        }
    }
}

/// A request that may proceed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Passed {
    token: Option<CsrfToken>,
    created: bool,
}

impl Passed {
    pub(crate) fn existing(token: CsrfToken) -> Self {
        Self {
            token: Some(token),
            created: false,
        }
    }

    pub(crate) fn created(token: CsrfToken) -> Self {
        Self {
            token: Some(token),
            created: true,
        }
    }

    pub(crate) fn without_token() -> Self {
        Self::default()
    }

    /// Token to attach to the request, if any.
    pub fn token(&self) -> Option<&CsrfToken> {
        self.token.as_ref()
    }

    /// Whether the token was generated for this request and must be
    /// persisted with the response.
    pub fn is_new(&self) -> bool {
        self.created
    }
}

/// Why a request was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// Neither the cookie nor the session holds a usable token.
    NoStoredToken,
    /// No token header or query parameter, and the body is not a form.
    NoHeaderToken,
    /// The form body does not contain the token within the buffer limit.
    NoBodyToken,
    /// The presented token does not match the stored one.
    Mismatch,
}

impl Reason {
    /// Message handed to the error handler.
    pub fn message(&self) -> &'static str {
        match self {
            Reason::NoStoredToken => "No CSRF token found in session or cookie",
            Reason::NoHeaderToken => "No CSRF token found in headers",
            Reason::NoBodyToken => "No CSRF token found in body",
            Reason::Mismatch => "CSRF tokens did not match",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A rejected request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    reason: Reason,
    clear_stored: bool,
}

impl Failure {
    pub(crate) fn new(reason: Reason) -> Self {
        Self {
            reason,
            clear_stored: false,
        }
    }

    pub(crate) fn clearing_stored(reason: Reason) -> Self {
        Self {
            reason,
            clear_stored: true,
        }
    }

    /// Why the request was rejected.
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Whether the stored token is unusable and should be removed along with
    /// the rejection.
    pub fn clears_stored_token(&self) -> bool {
        self.clear_stored
    }
}

/// Verification waiting for the form body.
#[derive(Debug)]
pub struct BodyCheck {
    kind: FormKind,
    expected: CsrfToken,
}

impl BodyCheck {
    pub(crate) fn new(kind: FormKind, expected: CsrfToken) -> Self {
        Self { kind, expected }
    }

    /// Encoding of the body to scan.
    pub fn form_kind(&self) -> &FormKind {
        &self.kind
    }

    /// Finish verification with a body prefix.
    ///
    /// `prefix` holds at most `post_body_buffer` bytes and `complete` tells
    /// whether it is the whole body. A body that overflowed the buffer before
    /// the token field counts as carrying no token.
    pub fn finish(
        self,
        csrf: &Csrf,
        parts: &Parts,
        prefix: &[u8],
        complete: bool,
    ) -> Result<Passed, Failure> {
        let token_name = &csrf.config().token_name;
        match self.kind.find_field(prefix, complete, token_name) {
            Some(presented) => csrf.compare(parts, &presented, self.expected),
            None => Err(csrf.fail(parts, Failure::new(Reason::NoBodyToken))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsrfConfig;
    use crate::policy::HeaderRule;
    use crate::session::Session;
    use crate::tags::CorsTrusted;
    use http::header::{ACCEPT, CONTENT_TYPE, COOKIE};
    use http::{Method, Request};

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn csrf(config: CsrfConfig) -> Csrf {
        Csrf::builder(config).secret(SECRET).build().unwrap()
    }

    fn request(method: Method) -> Parts {
        Request::builder()
            .method(method)
            .uri("/form")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn with_session(mut parts: Parts, token: &str) -> Parts {
        parts
            .extensions
            .insert(Session::from_iter([("csrfToken", token)]));
        parts
    }

    fn failure(verdict: Verdict) -> Failure {
        match verdict {
            Verdict::Failed(failure) => failure,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    fn passed(verdict: Verdict) -> Passed {
        match verdict {
            Verdict::Passed(passed) => passed,
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn test_verdicts_leave_unchecked_state() {
        assert_eq!(State::default(), State::Unchecked);

        let csrf = csrf(CsrfConfig::new());
        for method in [Method::GET, Method::POST, Method::PUT] {
            assert_ne!(csrf.begin(&request(method)).state(), State::default());
        }
    }

    #[test]
    fn test_safe_request_passes_without_checking() {
        let csrf = csrf(CsrfConfig::new().create_if_not_found(|_: &Parts| false));
        let verdict = csrf.begin(&request(Method::GET));
        assert_eq!(verdict.state(), State::Passed);
        assert_eq!(passed(verdict), Passed::without_token());
    }

    #[test]
    fn test_get_creates_token_when_missing() {
        let csrf = csrf(CsrfConfig::new());
        let mut parts = request(Method::GET);
        parts.headers.insert(ACCEPT, "text/html".parse().unwrap());

        let passed = passed(csrf.begin(&parts));
        assert!(passed.is_new());
        let token = passed.token().unwrap();
        assert!(csrf.provider().compare(token.value(), token.value()));
    }

    #[test]
    fn test_get_reuses_existing_token() {
        let csrf = csrf(CsrfConfig::new());
        let stored = csrf.provider().generate();
        let parts = with_session(request(Method::GET), &stored);

        let passed = passed(csrf.begin(&parts));
        assert!(!passed.is_new());
        assert!(csrf.provider().compare(passed.token().unwrap().value(), &stored));
    }

    #[test]
    fn test_no_token_anywhere_fails() {
        let csrf = csrf(CsrfConfig::new());
        let failure = failure(csrf.begin(&request(Method::POST)));
        assert_eq!(failure.reason(), Reason::NoStoredToken);
        assert!(!failure.clears_stored_token());
    }

    #[test]
    fn test_undecodable_stored_token_fails_and_clears() {
        let csrf = csrf(CsrfConfig::new());
        let parts = with_session(request(Method::POST), "tampered");

        let failure = failure(csrf.begin(&parts));
        assert_eq!(failure.reason(), Reason::NoStoredToken);
        assert!(failure.clears_stored_token());
    }

    #[test]
    fn test_stored_token_without_presented_token() {
        let csrf = csrf(CsrfConfig::new());
        let parts = with_session(request(Method::POST), &csrf.provider().generate());
        assert_eq!(failure(csrf.begin(&parts)).reason(), Reason::NoHeaderToken);
    }

    #[test]
    fn test_header_token_matching_resigned_session_token_passes() {
        let csrf = csrf(CsrfConfig::new());
        let stored = csrf.provider().generate();
        let presented = csrf.provider().refresh(&stored).unwrap();
        assert_ne!(presented, stored);

        let mut parts = with_session(request(Method::POST), &stored);
        parts
            .headers
            .insert("csrf-token", presented.parse().unwrap());

        let passed = passed(csrf.begin(&parts));
        assert!(!passed.is_new());
    }

    #[test]
    fn test_header_token_mismatch_fails() {
        let csrf = csrf(CsrfConfig::new());
        let mut parts = with_session(request(Method::POST), &csrf.provider().generate());
        parts.headers.insert(
            "csrf-token",
            csrf.provider().generate().parse().unwrap(),
        );

        assert_eq!(failure(csrf.begin(&parts)).reason(), Reason::Mismatch);
    }

    #[test]
    fn test_query_string_token() {
        let csrf = csrf(CsrfConfig::new().sign_tokens(false));
        let stored = csrf.provider().generate();

        let mut parts = with_session(request(Method::POST), &stored);
        parts.uri = format!("/form?csrfToken={stored}").parse().unwrap();

        assert!(matches!(csrf.begin(&parts), Verdict::Passed(_)));
    }

    #[test]
    fn test_form_body_check() {
        let csrf = csrf(CsrfConfig::new());
        let stored = csrf.provider().generate();
        let mut parts = with_session(request(Method::POST), &stored);
        parts.headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );

        let Verdict::Checking(check) = csrf.begin(&parts) else {
            panic!("expected body check");
        };
        assert_eq!(check.form_kind(), &FormKind::UrlEncoded);

        let body = format!("csrfToken={}&name=x", csrf.provider().refresh(&stored).unwrap());
        assert!(check.finish(&csrf, &parts, body.as_bytes(), true).is_ok());
    }

    #[test]
    fn test_body_overflow_counts_as_no_token() {
        let csrf = csrf(CsrfConfig::new().post_body_buffer(16));
        let stored = csrf.provider().generate();
        let mut parts = with_session(request(Method::POST), &stored);
        parts.headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );

        let Verdict::Checking(check) = csrf.begin(&parts) else {
            panic!("expected body check");
        };
        // the first 16 bytes of a body whose token comes later
        let failure = check
            .finish(&csrf, &parts, b"comment=aaaaaaaa", false)
            .unwrap_err();
        assert_eq!(failure.reason(), Reason::NoBodyToken);
        assert_eq!(failure.reason().message(), "No CSRF token found in body");
    }

    #[test]
    fn test_cookie_storage() {
        let csrf = csrf(CsrfConfig::new().cookie_name("XSRF-TOKEN"));
        let stored = csrf.provider().generate();

        let mut parts = request(Method::DELETE);
        parts
            .headers
            .insert(COOKIE, format!("XSRF-TOKEN={stored}").parse().unwrap());
        parts.headers.insert("csrf-token", stored.parse().unwrap());

        assert!(matches!(csrf.begin(&parts), Verdict::Passed(_)));
    }

    #[test]
    fn test_protect_header_rule_overrides_default_checking() {
        let csrf = csrf(
            CsrfConfig::new().protect_header(HeaderRule::any("X-Requested-With").unwrap()),
        );

        assert_eq!(csrf.begin(&request(Method::POST)).state(), State::Passed);

        let mut ajax = request(Method::POST);
        ajax.headers
            .insert("x-requested-with", "XMLHttpRequest".parse().unwrap());
        assert_eq!(csrf.begin(&ajax).state(), State::Failed);
    }

    #[test]
    fn test_protect_header_rule_checks_safe_methods() {
        let csrf = csrf(
            CsrfConfig::new().protect_header(HeaderRule::any("X-Requested-With").unwrap()),
        );

        assert_eq!(csrf.begin(&request(Method::GET)).state(), State::Passed);

        let mut ajax = request(Method::GET);
        ajax.headers
            .insert("x-requested-with", "XMLHttpRequest".parse().unwrap());
        assert_eq!(failure(csrf.begin(&ajax)).reason(), Reason::NoStoredToken);

        let stored = csrf.provider().generate();
        let mut ajax = with_session(request(Method::GET), &stored);
        ajax.headers
            .insert("x-requested-with", "XMLHttpRequest".parse().unwrap());
        ajax.headers.insert("csrf-token", stored.parse().unwrap());
        assert_eq!(csrf.begin(&ajax).state(), State::Passed);
    }

    #[test]
    fn test_cors_trusted_request_passes() {
        let csrf = csrf(CsrfConfig::new());
        let mut parts = request(Method::POST);
        parts
            .extensions
            .insert(CorsTrusted::new("https://trusted.example"));

        assert_eq!(csrf.begin(&parts).state(), State::Passed);
    }

    #[test]
    fn test_modes() {
        let csrf = csrf(CsrfConfig::new().create_if_not_found(|_: &Parts| false));

        let checked = csrf.begin_with(&request(Method::GET), Mode::Check);
        assert_eq!(failure(checked).reason(), Reason::NoStoredToken);

        let added = passed(csrf.begin_with(&request(Method::POST), Mode::AddToken));
        assert!(added.is_new());
    }
}
