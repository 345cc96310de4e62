//! The CSRF engine
//!
//! [`Csrf`] ties the policy, token provider, token store and error handler
//! together. Host bindings drive it once per request:
//!
//! 1. [`Csrf::begin_with`] with the request head
//! 2. [`BodyCheck::finish`] with a bounded body prefix, if asked for one
//! 3. [`Csrf::reject`] on failure, or [`Csrf::attach`] on the response

use crate::body::FormKind;
use crate::config::CsrfConfig;
use crate::error::{ConfigError, Result};
use crate::handler::{ErrorHandler, ErrorResponse, ForbiddenHandler};
use crate::policy::PolicyEngine;
use crate::session::Session;
use crate::settings::CsrfSettings;
use crate::store::{Lookup, TokenStore};
use crate::token::{
    CsrfToken, SignedTokenProvider, TokenProvider, TokenSigner, UnsignedTokenProvider,
};
use crate::verify::{BodyCheck, Failure, Mode, Passed, Reason, Verdict};
use http::header::HeaderMap;
use http::request::Parts;
use std::fmt;
use std::sync::Arc;

/// Shared CSRF engine. Cheap to clone.
#[derive(Clone)]
pub struct Csrf {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<CsrfConfig>,
    policy: PolicyEngine,
    provider: Arc<dyn TokenProvider>,
    store: TokenStore,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Csrf {
    /// Start building an engine.
    pub fn builder(config: CsrfConfig) -> CsrfBuilder {
        CsrfBuilder::new(config)
    }

    /// Build an engine from loaded settings, signing with `CSRF_SECRET`.
    pub fn from_settings(settings: CsrfSettings) -> Result<Self> {
        let secret = settings.secret.clone();
        let mut builder = Self::builder(CsrfConfig::try_from(settings)?);
        if let Some(secret) = secret {
            builder = builder.secret(secret);
        }
        builder.build()
    }

    /// Build an engine from `CSRF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_settings(CsrfSettings::from_env()?)
    }

    /// The configuration.
    pub fn config(&self) -> &CsrfConfig {
        &self.inner.config
    }

    /// The policy engine.
    pub fn policy(&self) -> &PolicyEngine {
        &self.inner.policy
    }

    /// The token provider.
    pub fn provider(&self) -> &dyn TokenProvider {
        self.inner.provider.as_ref()
    }

    /// The token store.
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Generate a fresh token under the configured name.
    pub fn generate_token(&self) -> CsrfToken {
        CsrfToken::new(&self.inner.config.token_name, self.inner.provider.generate())
    }

    /// Verify a request head under [`Mode::Filter`].
    pub fn begin(&self, parts: &Parts) -> Verdict {
        self.begin_with(parts, Mode::Filter)
    }

    /// Verify a request head.
    pub fn begin_with(&self, parts: &Parts, mode: Mode) -> Verdict {
        let check = match mode {
            Mode::Filter => self.inner.policy.should_check(parts),
            Mode::Check => self.inner.policy.must_check(parts),
            Mode::AddToken => false,
        };

        if !check {
            return Verdict::Passed(self.pass(parts, mode));
        }

        let expected = match self.inner.store.lookup(parts) {
            Lookup::Found(token) => token,
            Lookup::Invalid(_) => {
                return Verdict::Failed(
                    self.fail(parts, Failure::clearing_stored(Reason::NoStoredToken)),
                )
            }
            Lookup::Missing => {
                return Verdict::Failed(self.fail(parts, Failure::new(Reason::NoStoredToken)))
            }
        };

        if let Some(presented) = self.presented_token(parts) {
            return self.compare(parts, &presented, expected).into();
        }

        match FormKind::from_headers(&parts.headers) {
            Some(kind) => Verdict::Checking(BodyCheck::new(kind, expected)),
            None => Verdict::Failed(self.fail(parts, Failure::new(Reason::NoHeaderToken))),
        }
    }

    fn pass(&self, parts: &Parts, mode: Mode) -> Passed {
        if let Some(token) = self.inner.store.extract(parts) {
            return Passed::existing(token);
        }

        if mode == Mode::AddToken || (self.inner.config.create_if_not_found)(parts) {
            tracing::trace!(uri = %parts.uri, "creating CSRF token");
            Passed::created(self.generate_token())
        } else {
            Passed::without_token()
        }
    }

    /// Token presented in the header, falling back to the query string.
    fn presented_token(&self, parts: &Parts) -> Option<String> {
        let from_header = parts
            .headers
            .get(&self.inner.config.header_name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        from_header.or_else(|| {
            let query = parts.uri.query()?;
            serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                .ok()?
                .into_iter()
                .find(|(key, value)| key == &self.inner.config.token_name && !value.is_empty())
                .map(|(_, value)| value)
        })
    }

    pub(crate) fn compare(
        &self,
        parts: &Parts,
        presented: &str,
        expected: CsrfToken,
    ) -> std::result::Result<Passed, Failure> {
        if self.inner.provider.compare(presented, expected.value()) {
            Ok(Passed::existing(expected))
        } else {
            Err(self.fail(parts, Failure::new(Reason::Mismatch)))
        }
    }

    pub(crate) fn fail(&self, parts: &Parts, failure: Failure) -> Failure {
        tracing::warn!(
            method = %parts.method,
            uri = %parts.uri,
            reason = %failure.reason(),
            "CSRF check failed"
        );
        failure
    }

    /// Build the rejection response for a failed request.
    ///
    /// Undecodable stored tokens are removed along with the rejection.
    pub async fn reject(&self, parts: &Parts, failure: &Failure) -> ErrorResponse {
        let mut response = self
            .inner
            .error_handler
            .handle(parts, failure.reason().message())
            .await;

        if failure.clears_stored_token() {
            self.inner
                .store
                .clear(response.headers_mut(), parts.extensions.get::<Session>());
        }
        response
    }

    /// Persist a newly created token with the response.
    ///
    /// Returns whether anything was written.
    pub fn attach(&self, passed: &Passed, headers: &mut HeaderMap, session: Option<&Session>) -> bool {
        match passed.token() {
            Some(token) if passed.is_new() => self.inner.store.inject(headers, session, token),
            _ => false,
        }
    }
}

impl fmt::Debug for Csrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csrf")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Csrf`].
pub struct CsrfBuilder {
    config: CsrfConfig,
    secret: Option<Vec<u8>>,
    provider: Option<Arc<dyn TokenProvider>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl CsrfBuilder {
    fn new(config: CsrfConfig) -> Self {
        Self {
            config,
            secret: None,
            provider: None,
            error_handler: None,
        }
    }

    /// Secret used to sign tokens. At least 32 bytes.
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = Some(secret.as_ref().to_vec());
        self
    }

    /// Replace the token provider chosen from `sign_tokens`.
    pub fn token_provider(mut self, provider: impl TokenProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Replace the default 403 error handler.
    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, and when signing is enabled without a
    /// usable secret.
    pub fn build(self) -> Result<Csrf> {
        self.config.validate()?;

        let provider: Arc<dyn TokenProvider> = match self.provider {
            Some(provider) => provider,
            None if self.config.sign_tokens => {
                let secret = self.secret.ok_or(ConfigError::MissingSecret)?;
                Arc::new(SignedTokenProvider::new(TokenSigner::new(secret)?))
            }
            None => Arc::new(UnsignedTokenProvider),
        };
        let error_handler = self
            .error_handler
            .unwrap_or_else(|| Arc::new(ForbiddenHandler));

        tracing::debug!(
            signed = self.config.sign_tokens,
            cookie = ?self.config.cookie_name,
            "CSRF protection configured"
        );

        let config = Arc::new(self.config);
        Ok(Csrf {
            inner: Arc::new(Inner {
                policy: PolicyEngine::new(config.clone()),
                store: TokenStore::new(config.clone(), provider.clone()),
                config,
                provider,
                error_handler,
            }),
        })
    }
}

impl fmt::Debug for CsrfBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
