//! CSRF tokens and token providers
//!
//! A raw token is 12 random bytes, hex-encoded. A signed token has the form
//! `<hmac>-<nonce>-<raw>`: the HMAC-SHA256 tag covers `<nonce>-<raw>`, and a
//! fresh random nonce goes into every signature. The same raw token therefore
//! never travels twice with the same bytes, which keeps compression side
//! channels from learning it across responses.

use crate::error::{ConfigError, Result};
use hmac::{Hmac, Mac};
use http::Extensions;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a raw token.
pub const RAW_TOKEN_BYTES: usize = 12;

/// Number of random bytes in a signature nonce.
const NONCE_BYTES: usize = 8;

/// Minimum length of a signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// A CSRF token as seen by the current request.
///
/// Stored in the request extensions by the CSRF layer, so handlers can embed
/// it in rendered forms. Use [`get_token`] to read it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CsrfToken {
    name: String,
    value: String,
}

impl CsrfToken {
    /// Create a token from its field name and wire value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Field / session entry name the token travels under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wire value of the token.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfToken")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Get the token attached to the current request, if any.
///
/// Absence is a normal outcome (for example on requests that were neither
/// checked nor eligible for token creation); callers decide what to render.
pub fn get_token(extensions: &Extensions) -> Option<CsrfToken> {
    extensions.get::<CsrfToken>().cloned()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fresh raw token.
pub fn generate_raw() -> String {
    random_hex(RAW_TOKEN_BYTES)
}

/// Compare two strings in time independent of where they differ.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Signs and verifies tokens with a server secret.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    /// Create a signer.
    ///
    /// # Errors
    ///
    /// Fails when the secret is shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }

        let mac = HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::SecretTooShort {
            min: MIN_SECRET_LEN,
            actual: secret.len(),
        })?;
        Ok(Self { mac })
    }

    fn tag(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    /// Sign a raw token under a fresh nonce.
    pub fn sign(&self, raw: &str) -> String {
        let payload = format!("{}-{}", random_hex(NONCE_BYTES), raw);
        let tag = hex::encode(self.tag(&payload).finalize().into_bytes());
        format!("{tag}-{payload}")
    }

    /// Verify a signed token and return its raw value.
    ///
    /// Malformed input and bad signatures both yield `None`.
    pub fn extract<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (tag, payload) = signed.split_once('-')?;
        let tag = hex::decode(tag).ok()?;
        self.tag(payload).verify_slice(&tag).ok()?;

        let (_nonce, raw) = payload.split_once('-')?;
        (!raw.is_empty()).then_some(raw)
    }

    /// Verify a signed token and sign its raw value again under a new nonce.
    pub fn resign(&self, signed: &str) -> Option<String> {
        self.extract(signed).map(|raw| self.sign(raw))
    }

    /// Compare two signed tokens by their raw values.
    pub fn compare(&self, a: &str, b: &str) -> bool {
        match (self.extract(a), self.extract(b)) {
            (Some(a), Some(b)) => constant_time_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

/// Generates and compares tokens.
pub trait TokenProvider: Send + Sync + 'static {
    /// Generate a new token in wire form.
    fn generate(&self) -> String;

    /// Check that a presented token matches the expected one.
    fn compare(&self, presented: &str, expected: &str) -> bool;

    /// Validate a stored token and produce the form handed to the request.
    ///
    /// `None` means the stored value is not a usable token.
    fn refresh(&self, stored: &str) -> Option<String>;
}

/// HMAC-signed tokens, re-signed on every read.
#[derive(Clone, Debug)]
pub struct SignedTokenProvider {
    signer: TokenSigner,
}

impl SignedTokenProvider {
    /// Create a provider from a signer.
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }

    /// The underlying signer.
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }
}

impl TokenProvider for SignedTokenProvider {
    fn generate(&self) -> String {
        self.signer.sign(&generate_raw())
    }

    fn compare(&self, presented: &str, expected: &str) -> bool {
        self.signer.compare(presented, expected)
    }

    fn refresh(&self, stored: &str) -> Option<String> {
        self.signer.resign(stored)
    }
}

/// Plain random tokens compared in constant time.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsignedTokenProvider;

impl TokenProvider for UnsignedTokenProvider {
    fn generate(&self) -> String {
        generate_raw()
    }

    fn compare(&self, presented: &str, expected: &str) -> bool {
        constant_time_eq(presented, expected)
    }

    fn refresh(&self, stored: &str) -> Option<String> {
        (!stored.is_empty()).then(|| stored.to_string())
    }
}
