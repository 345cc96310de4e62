//! Token extraction and injection
//!
//! The expected token is looked up in the request attribute first, then the
//! token cookie (when configured), then the session. Outgoing tokens go to the
//! cookie jar or the session, whichever the configuration selects.

use crate::config::CsrfConfig;
use crate::session::Session;
use crate::token::{CsrfToken, TokenProvider};
use cookie::Cookie;
use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, COOKIE, SET_COOKIE};
use http::request::Parts;
use http::Extensions;
use std::sync::Arc;

/// Where a stored token was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
    /// Attached earlier in the same request
    Attribute,
    /// The token cookie
    Cookie,
    /// The session map
    Session,
}

/// Result of looking up the expected token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// A usable token, already refreshed for this request
    Found(CsrfToken),
    /// A stored value that failed to decode
    Invalid(TokenSource),
    /// Nothing stored
    Missing,
}

impl Lookup {
    /// The usable token, if any.
    pub fn token(self) -> Option<CsrfToken> {
        match self {
            Lookup::Found(token) => Some(token),
            Lookup::Invalid(_) | Lookup::Missing => None,
        }
    }
}

/// Reads and writes tokens in the configured storage.
#[derive(Clone)]
pub struct TokenStore {
    config: Arc<CsrfConfig>,
    provider: Arc<dyn TokenProvider>,
}

impl TokenStore {
    /// Create a store.
    pub fn new(config: Arc<CsrfConfig>, provider: Arc<dyn TokenProvider>) -> Self {
        Self { config, provider }
    }

    /// Look up the expected token.
    ///
    /// The first stored value wins; it is passed through
    /// [`TokenProvider::refresh`], so signed tokens come back re-signed.
    pub fn lookup(&self, parts: &Parts) -> Lookup {
        let Some((source, stored)) = self.stored(parts) else {
            return Lookup::Missing;
        };

        match self.provider.refresh(&stored) {
            Some(value) => Lookup::Found(CsrfToken::new(&self.config.token_name, value)),
            None => {
                tracing::debug!(?source, uri = %parts.uri, "stored CSRF token failed to decode");
                Lookup::Invalid(source)
            }
        }
    }

    /// Extract the expected token, treating undecodable values as absent.
    pub fn extract(&self, parts: &Parts) -> Option<CsrfToken> {
        self.lookup(parts).token()
    }

    fn stored(&self, parts: &Parts) -> Option<(TokenSource, String)> {
        if let Some(token) = parts.extensions.get::<CsrfToken>() {
            return Some((TokenSource::Attribute, token.value().to_string()));
        }

        if let Some(name) = &self.config.cookie_name {
            if let Some(value) = cookie_value(&parts.headers, name) {
                return Some((TokenSource::Cookie, value));
            }
        }

        parts
            .extensions
            .get::<Session>()
            .and_then(|session| session.get(&self.config.token_name))
            .map(|value| (TokenSource::Session, value))
    }

    /// Attach a token to the request so later code observes it.
    pub fn stamp(&self, extensions: &mut Extensions, token: CsrfToken) {
        extensions.insert(token);
    }

    /// Persist a new token with the response.
    ///
    /// Cacheable responses are left alone, since a shared cache would hand
    /// the same token to other users. Returns whether the token was written.
    pub fn inject(
        &self,
        headers: &mut HeaderMap,
        session: Option<&Session>,
        token: &CsrfToken,
    ) -> bool {
        if is_cacheable(headers) {
            tracing::debug!("not adding CSRF token to cacheable response");
            return false;
        }

        match &self.config.cookie_name {
            Some(name) => append_cookie(headers, self.cookie(name, token.value())),
            None => match session {
                Some(session) => {
                    session.insert(&self.config.token_name, token.value());
                    true
                }
                None => {
                    tracing::debug!("no session on request, CSRF token not persisted");
                    false
                }
            },
        }
    }

    /// Remove the stored token.
    pub fn clear(&self, headers: &mut HeaderMap, session: Option<&Session>) {
        match &self.config.cookie_name {
            Some(name) => {
                let mut cookie = self.cookie(name, "");
                cookie.make_removal();
                append_cookie(headers, cookie);
            }
            None => {
                if let Some(session) = session {
                    session.remove(&self.config.token_name);
                }
            }
        }
    }

    fn cookie(&self, name: &str, value: &str) -> Cookie<'static> {
        let mut cookie = Cookie::build((name.to_string(), value.to_string()))
            .path(self.config.cookie_path.clone())
            .secure(self.config.secure_cookie)
            .http_only(self.config.http_only_cookie);

        if let Some(same_site) = self.config.same_site_cookie {
            cookie = cookie.same_site(same_site);
        }
        if let Some(domain) = &self.config.cookie_domain {
            cookie = cookie.domain(domain.clone());
        }

        cookie.build()
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

fn append_cookie(headers: &mut HeaderMap, cookie: Cookie<'_>) -> bool {
    match HeaderValue::try_from(cookie.to_string()) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
            true
        }
        Err(error) => {
            tracing::debug!(%error, "CSRF cookie is not a valid header value");
            false
        }
    }
}

/// Whether a shared cache may store the response.
pub fn is_cacheable(headers: &HeaderMap) -> bool {
    let mut directives = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .peekable();

    if directives.peek().is_none() {
        return false;
    }

    !directives.any(|directive| {
        directive.eq_ignore_ascii_case("no-cache") || directive.eq_ignore_ascii_case("no-store")
    })
}
