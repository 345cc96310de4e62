//! Environment-driven configuration.
//!
//! [`CsrfSettings`] is the serializable face of [`CsrfConfig`]. It is loaded
//! from `CSRF_`-prefixed environment variables (after an optional `.env`
//! file) and validated into a config once at startup.
//!
//! # Example
//!
//! ```ignore
//! use csrfguard_core::{CsrfConfig, CsrfSettings};
//!
//! // CSRF_COOKIE_NAME=XSRF-TOKEN
//! // CSRF_PROTECT_HEADERS=Cookie=*,Authorization=*
//! let settings = CsrfSettings::from_env()?;
//! let config = CsrfConfig::try_from(settings)?;
//! ```

use crate::config::{
    CsrfConfig, DEFAULT_HEADER_NAME, DEFAULT_POST_BODY_BUFFER, DEFAULT_TOKEN_NAME,
    NOCSRF_MODIFIER,
};
use crate::error::{ConfigError, Result};
use crate::policy::{parse_header_name, HeaderRule, HeaderRules, ListPolicy};
use cookie::SameSite;
use serde::Deserialize;

/// Prefix of every environment variable read by [`CsrfSettings::from_env`].
pub const ENV_PREFIX: &str = "CSRF_";

/// Raw CSRF settings.
///
/// Field names map to SCREAMING_SNAKE_CASE variables behind [`ENV_PREFIX`]
/// (`token_name` reads `CSRF_TOKEN_NAME`). Lists are comma-separated; an empty
/// variable clears a list. Header rules are `Name=value` entries where `*`
/// matches any value.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsrfSettings {
    /// Token name
    pub token_name: String,
    /// Cookie name, session storage when unset
    pub cookie_name: Option<String>,
    /// Secure cookie flag
    pub secure_cookie: bool,
    /// HttpOnly cookie flag
    pub http_only_cookie: bool,
    /// `strict`, `lax`, `none` or `off`
    pub same_site_cookie: Option<String>,
    /// Cookie path
    pub cookie_path: String,
    /// Cookie domain
    pub cookie_domain: Option<String>,
    /// Body buffer size in bytes
    pub post_body_buffer: usize,
    /// Sign tokens
    pub sign_tokens: bool,
    /// Signing secret
    pub secret: Option<String>,
    /// Methods exempt from checking
    pub method_white_list: Vec<String>,
    /// Methods checked when the white list is empty
    pub method_black_list: Vec<String>,
    /// Content types exempt from checking
    pub content_type_white_list: Vec<String>,
    /// Content types checked when the white list is empty
    pub content_type_black_list: Vec<String>,
    /// Token header name
    pub header_name: String,
    /// Protect header rules
    pub protect_headers: Vec<String>,
    /// Bypass header rules
    pub bypass_headers: Vec<String>,
    /// Route modifiers exempting a route
    pub route_modifier_white_list: Vec<String>,
    /// Route modifiers opting a route in when the white list is empty
    pub route_modifier_black_list: Vec<String>,
    /// Skip CORS-trusted requests
    pub bypass_cors_trusted_origins: bool,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            cookie_name: None,
            secure_cookie: false,
            http_only_cookie: false,
            same_site_cookie: None,
            cookie_path: "/".to_string(),
            cookie_domain: None,
            post_body_buffer: DEFAULT_POST_BODY_BUFFER,
            sign_tokens: true,
            secret: None,
            method_white_list: vec!["GET".into(), "HEAD".into(), "OPTIONS".into()],
            method_black_list: Vec::new(),
            content_type_white_list: Vec::new(),
            content_type_black_list: Vec::new(),
            header_name: DEFAULT_HEADER_NAME.to_string(),
            protect_headers: Vec::new(),
            bypass_headers: Vec::new(),
            route_modifier_white_list: vec![NOCSRF_MODIFIER.into()],
            route_modifier_black_list: Vec::new(),
            bypass_cors_trusted_origins: true,
        }
    }
}

impl CsrfSettings {
    /// Load a `.env` file if present, then read `CSRF_*` variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field type.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(envy::prefixed(ENV_PREFIX).from_env()?)
    }

    /// Read settings from explicit `(name, value)` pairs using the `CSRF_`
    /// prefix.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter(vars)?)
    }
}

impl TryFrom<CsrfSettings> for CsrfConfig {
    type Error = ConfigError;

    fn try_from(settings: CsrfSettings) -> Result<Self> {
        let same_site = match settings.same_site_cookie.as_deref().map(str::trim) {
            None => Some(SameSite::Lax),
            Some(value) => parse_same_site(value)?,
        };

        let config = CsrfConfig {
            token_name: settings.token_name,
            cookie_name: settings.cookie_name.filter(|name| !name.trim().is_empty()),
            secure_cookie: settings.secure_cookie,
            http_only_cookie: settings.http_only_cookie,
            same_site_cookie: same_site,
            cookie_path: settings.cookie_path,
            cookie_domain: settings.cookie_domain.filter(|domain| !domain.trim().is_empty()),
            post_body_buffer: settings.post_body_buffer,
            sign_tokens: settings.sign_tokens,
            method_policy: list_policy(settings.method_white_list, settings.method_black_list),
            content_type_policy: list_policy(
                settings.content_type_white_list,
                settings.content_type_black_list,
            ),
            header_name: parse_header_name(&settings.header_name)?,
            header_rules: HeaderRules {
                protect: header_rules(&settings.protect_headers)?,
                bypass: header_rules(&settings.bypass_headers)?,
            },
            route_modifiers: list_policy(
                settings.route_modifier_white_list,
                settings.route_modifier_black_list,
            ),
            ..CsrfConfig::default()
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_same_site(value: &str) -> Result<Option<SameSite>> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(Some(SameSite::Strict)),
        "lax" => Ok(Some(SameSite::Lax)),
        "none" => Ok(Some(SameSite::None)),
        "off" | "" => Ok(None),
        _ => Err(ConfigError::InvalidSameSite(value.to_string())),
    }
}

fn list_policy(white_list: Vec<String>, black_list: Vec<String>) -> ListPolicy {
    ListPolicy {
        white_list: non_empty(white_list),
        black_list: non_empty(black_list),
    }
}

fn non_empty(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn header_rules(rules: &[String]) -> Result<Vec<HeaderRule>> {
    rules
        .iter()
        .map(|rule| rule.trim())
        .filter(|rule| !rule.is_empty())
        .map(HeaderRule::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::HeaderMatch;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let settings = CsrfSettings::from_vars(Vec::new()).unwrap();
        let config = CsrfConfig::try_from(settings).unwrap();
        let defaults = CsrfConfig::new();

        assert_eq!(config.token_name, defaults.token_name);
        assert_eq!(config.header_name, defaults.header_name);
        assert_eq!(config.post_body_buffer, defaults.post_body_buffer);
        assert_eq!(config.method_policy, defaults.method_policy);
        assert_eq!(config.content_type_policy, defaults.content_type_policy);
        assert_eq!(config.route_modifiers, defaults.route_modifiers);
        assert_eq!(config.same_site_cookie, Some(SameSite::Lax));
        assert!(config.sign_tokens);
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let settings = CsrfSettings::from_vars(vars(&[
            ("CSRF_COOKIE_NAME", "XSRF-TOKEN"),
            ("CSRF_SECURE_COOKIE", "true"),
            ("CSRF_SAME_SITE_COOKIE", "strict"),
            ("CSRF_POST_BODY_BUFFER", "2048"),
            ("CSRF_SIGN_TOKENS", "false"),
            ("CSRF_SECRET", "not-used-when-unsigned"),
            ("CSRF_METHOD_WHITE_LIST", ""),
            ("CSRF_METHOD_BLACK_LIST", "POST,DELETE"),
            ("CSRF_HEADER_NAME", "X-XSRF-TOKEN"),
            ("CSRF_PROTECT_HEADERS", "Cookie=*,Authorization=*"),
            ("CSRF_BYPASS_HEADERS", "Csrf-Token=nocheck"),
            ("OTHER_VAR", "ignored"),
        ]))
        .unwrap();
        assert_eq!(settings.secret.as_deref(), Some("not-used-when-unsigned"));

        let config = CsrfConfig::try_from(settings).unwrap();
        assert_eq!(config.cookie_name.as_deref(), Some("XSRF-TOKEN"));
        assert!(config.secure_cookie);
        assert_eq!(config.same_site_cookie, Some(SameSite::Strict));
        assert_eq!(config.post_body_buffer, 2048);
        assert!(!config.sign_tokens);
        assert!(config.method_policy.white_list.is_empty());
        assert_eq!(config.method_policy.black_list, vec!["POST", "DELETE"]);
        assert_eq!(config.header_name.as_str(), "x-xsrf-token");
        assert_eq!(config.header_rules.protect.len(), 2);
        assert_eq!(
            config.header_rules.bypass[0].expected(),
            &HeaderMatch::Exact("nocheck".to_string())
        );
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let settings =
            CsrfSettings::from_vars(vars(&[("CSRF_SAME_SITE_COOKIE", "sometimes")])).unwrap();
        assert!(matches!(
            CsrfConfig::try_from(settings),
            Err(ConfigError::InvalidSameSite(_))
        ));

        let settings =
            CsrfSettings::from_vars(vars(&[("CSRF_PROTECT_HEADERS", "Cookie")])).unwrap();
        assert!(matches!(
            CsrfConfig::try_from(settings),
            Err(ConfigError::InvalidHeaderRule(_))
        ));

        let settings = CsrfSettings::from_vars(vars(&[("CSRF_HEADER_NAME", "bad header")])).unwrap();
        assert!(matches!(
            CsrfConfig::try_from(settings),
            Err(ConfigError::InvalidHeaderName(_))
        ));

        assert!(matches!(
            CsrfSettings::from_vars(vars(&[("CSRF_POST_BODY_BUFFER", "lots")])),
            Err(ConfigError::Env(_))
        ));
    }
}
