//! CSRF configuration and its defaults

use crate::error::{ConfigError, Result};
use crate::policy::{HeaderRule, HeaderRules, ListPolicy};
use cookie::SameSite;
use http::header::{HeaderName, ACCEPT};
use http::request::Parts;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Default name of the session entry, cookie-less form field and query parameter.
pub const DEFAULT_TOKEN_NAME: &str = "csrfToken";

/// Default header carrying the presented token.
pub const DEFAULT_HEADER_NAME: &str = "Csrf-Token";

/// Default number of body bytes inspected for a form token: 100KB
pub const DEFAULT_POST_BODY_BUFFER: usize = 100 * 1024;

/// Route modifier that exempts a route by default.
pub const NOCSRF_MODIFIER: &str = "nocsrf";

/// A predicate over the request head.
pub type RequestPredicate = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Configuration for CSRF protection.
///
/// Built once at startup and shared read-only by every component.
#[derive(Clone)]
pub struct CsrfConfig {
    /// Name of the session entry, form field and query parameter holding the token.
    /// Default: "csrfToken"
    pub token_name: String,

    /// Cookie storing the token. `None` stores it in the session instead.
    /// Default: None
    pub cookie_name: Option<String>,

    /// Whether the token cookie is HTTPS only.
    /// Default: false
    pub secure_cookie: bool,

    /// Whether the token cookie is hidden from scripts.
    /// Default: false
    pub http_only_cookie: bool,

    /// SameSite attribute of the token cookie. `None` omits the attribute.
    /// Default: Lax
    pub same_site_cookie: Option<SameSite>,

    /// Path of the token cookie.
    /// Default: "/"
    pub cookie_path: String,

    /// Domain of the token cookie.
    /// Default: None
    pub cookie_domain: Option<String>,

    /// How many body bytes may be buffered while looking for a form token.
    /// Default: 102400
    pub post_body_buffer: usize,

    /// Whether tokens are HMAC-signed and re-signed on every use.
    /// Default: true
    pub sign_tokens: bool,

    /// Which methods are checked.
    /// Default: everything except GET, HEAD and OPTIONS
    pub method_policy: ListPolicy,

    /// Which content types are checked.
    /// Default: all
    pub content_type_policy: ListPolicy,

    /// Header carrying the presented token.
    /// Default: "Csrf-Token"
    pub header_name: HeaderName,

    /// Header rules forcing checking on or off.
    /// Default: none
    pub header_rules: HeaderRules,

    /// Which route modifiers keep a route protected.
    /// Default: everything except routes tagged `nocsrf`
    pub route_modifiers: ListPolicy,

    /// Extra predicate deciding whether a request must be protected.
    /// Default: always
    pub should_protect: RequestPredicate,

    /// Whether a missing token is created for requests that pass.
    /// Default: GET requests accepting HTML
    pub create_if_not_found: RequestPredicate,

    /// Skip checking for requests an upstream CORS filter has trusted.
    /// Default: true
    pub bypass_cors_trusted_origins: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            cookie_name: None,
            secure_cookie: false,
            http_only_cookie: false,
            same_site_cookie: Some(SameSite::Lax),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            post_body_buffer: DEFAULT_POST_BODY_BUFFER,
            sign_tokens: true,
            method_policy: ListPolicy::white_list(["GET", "HEAD", "OPTIONS"]),
            content_type_policy: ListPolicy::all(),
            header_name: HeaderName::from_static("csrf-token"),
            header_rules: HeaderRules::default(),
            route_modifiers: ListPolicy::white_list([NOCSRF_MODIFIER]),
            should_protect: Arc::new(|_: &Parts| true),
            create_if_not_found: Arc::new(accepts_html),
            bypass_cors_trusted_origins: true,
        }
    }
}

impl CsrfConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token name.
    pub fn token_name(mut self, name: impl Into<String>) -> Self {
        self.token_name = name.into();
        self
    }

    /// Store tokens in the named cookie.
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Store tokens in the session.
    pub fn session_storage(mut self) -> Self {
        self.cookie_name = None;
        self
    }

    /// Set the secure flag.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    /// Set the HttpOnly flag.
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only_cookie = http_only;
        self
    }

    /// Set the SameSite attribute.
    pub fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site_cookie = same_site;
        self
    }

    /// Set the cookie path.
    pub fn cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set the cookie domain.
    pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set the body buffer size in bytes.
    pub fn post_body_buffer(mut self, bytes: usize) -> Self {
        self.post_body_buffer = bytes;
        self
    }

    /// Enable or disable token signing.
    pub fn sign_tokens(mut self, sign: bool) -> Self {
        self.sign_tokens = sign;
        self
    }

    /// Set the method lists.
    pub fn method_policy(mut self, policy: ListPolicy) -> Self {
        self.method_policy = policy;
        self
    }

    /// Set the content-type lists.
    pub fn content_type_policy(mut self, policy: ListPolicy) -> Self {
        self.content_type_policy = policy;
        self
    }

    /// Set the token header name.
    pub fn header_name(mut self, name: HeaderName) -> Self {
        self.header_name = name;
        self
    }

    /// Add a protect rule.
    pub fn protect_header(mut self, rule: HeaderRule) -> Self {
        self.header_rules.protect.push(rule);
        self
    }

    /// Add a bypass rule.
    pub fn bypass_header(mut self, rule: HeaderRule) -> Self {
        self.header_rules.bypass.push(rule);
        self
    }

    /// Set the route modifier lists.
    pub fn route_modifiers(mut self, policy: ListPolicy) -> Self {
        self.route_modifiers = policy;
        self
    }

    /// Set the extra protection predicate.
    pub fn should_protect<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.should_protect = Arc::new(predicate);
        self
    }

    /// Set the token creation predicate.
    pub fn create_if_not_found<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.create_if_not_found = Arc::new(predicate);
        self
    }

    /// Enable or disable the CORS trust bypass.
    pub fn bypass_cors_trusted_origins(mut self, bypass: bool) -> Self {
        self.bypass_cors_trusted_origins = bypass;
        self
    }

    /// Reject values no request could ever satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.token_name.trim().is_empty() {
            return Err(ConfigError::EmptyTokenName);
        }
        if self.post_body_buffer == 0 {
            return Err(ConfigError::ZeroBodyBuffer);
        }
        Ok(())
    }
}

impl fmt::Debug for CsrfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfConfig")
            .field("token_name", &self.token_name)
            .field("cookie_name", &self.cookie_name)
            .field("secure_cookie", &self.secure_cookie)
            .field("http_only_cookie", &self.http_only_cookie)
            .field("same_site_cookie", &self.same_site_cookie)
            .field("cookie_path", &self.cookie_path)
            .field("cookie_domain", &self.cookie_domain)
            .field("post_body_buffer", &self.post_body_buffer)
            .field("sign_tokens", &self.sign_tokens)
            .field("method_policy", &self.method_policy)
            .field("content_type_policy", &self.content_type_policy)
            .field("header_name", &self.header_name)
            .field("header_rules", &self.header_rules)
            .field("route_modifiers", &self.route_modifiers)
            .field("bypass_cors_trusted_origins", &self.bypass_cors_trusted_origins)
            .finish_non_exhaustive()
    }
}

/// Default token creation predicate: GET requests that accept HTML.
///
/// A request without an `Accept` header accepts anything.
pub fn accepts_html(parts: &Parts) -> bool {
    if parts.method != Method::GET {
        return false;
    }

    let mut ranges = parts
        .headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|range| range.split(';').next())
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .peekable();

    if ranges.peek().is_none() {
        return true;
    }

    ranges.any(|range| {
        ["text/html", "application/xhtml+xml", "text/*", "*/*"]
            .iter()
            .any(|accepted| range.eq_ignore_ascii_case(accepted))
    })
}
