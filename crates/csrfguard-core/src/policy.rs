//! Policy engine
//!
//! Decides, per request, whether CSRF verification applies. Everything here
//! is a pure predicate over the request head.

use crate::config::CsrfConfig;
use crate::error::{ConfigError, Result};
use crate::tags::{CorsTrusted, RouteModifiers};
use http::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use http::request::Parts;
use std::sync::Arc;

/// A white list / black list pair.
///
/// A non-empty white list wins: everything *not* listed is selected. Otherwise
/// a non-empty black list selects exactly the listed values. With both lists
/// empty every value is selected. Comparisons ignore ASCII case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPolicy {
    /// Values exempt from checking
    pub white_list: Vec<String>,
    /// Values that are the only ones checked (used when the white list is empty)
    pub black_list: Vec<String>,
}

impl ListPolicy {
    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select everything except `items`.
    pub fn white_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            white_list: items.into_iter().map(Into::into).collect(),
            black_list: Vec::new(),
        }
    }

    /// Select only `items`.
    pub fn black_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            white_list: Vec::new(),
            black_list: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a request described by `values` is selected.
    ///
    /// A request may carry several values (route modifiers) or none (a
    /// missing content type); any listed value counts as a hit.
    pub fn selects<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !self.white_list.is_empty() {
            !values.into_iter().any(|v| listed(&self.white_list, v))
        } else if !self.black_list.is_empty() {
            values.into_iter().any(|v| listed(&self.black_list, v))
        } else {
            true
        }
    }
}

fn listed(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

/// What a header rule expects the header value to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderMatch {
    /// Any value, as long as the header is present (`*`)
    Any,
    /// Exactly this value
    Exact(String),
}

/// A single `Name=value` header rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderRule {
    name: HeaderName,
    expected: HeaderMatch,
}

impl HeaderRule {
    /// Match requests that carry `name` with any value.
    pub fn any(name: &str) -> Result<Self> {
        Ok(Self {
            name: parse_header_name(name)?,
            expected: HeaderMatch::Any,
        })
    }

    /// Match requests that carry `name` with exactly `value`.
    pub fn exact(name: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: parse_header_name(name)?,
            expected: HeaderMatch::Exact(value.into()),
        })
    }

    /// Parse `Name=value`; a value of `*` matches any value.
    pub fn parse(rule: &str) -> Result<Self> {
        let (name, value) = rule
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidHeaderRule(rule.to_string()))?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return Err(ConfigError::InvalidHeaderRule(rule.to_string()));
        }

        match value {
            "*" => Self::any(name),
            value => Self::exact(name, value),
        }
    }

    /// The header this rule inspects.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// The expected value.
    pub fn expected(&self) -> &HeaderMatch {
        &self.expected
    }

    /// Check the rule against request headers.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        headers.get_all(&self.name).iter().any(|value| match &self.expected {
            HeaderMatch::Any => true,
            HeaderMatch::Exact(expected) => value.as_bytes() == expected.as_bytes(),
        })
    }
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| ConfigError::InvalidHeaderName(name.to_string()))
}

/// Header rules that force checking on (`protect`) or off (`bypass`).
///
/// An empty protect set protects every request. A matching bypass rule
/// always wins over protect rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderRules {
    /// When non-empty, check only requests matching one of these, whatever
    /// their method and content type
    pub protect: Vec<HeaderRule>,
    /// Never check requests matching one of these
    pub bypass: Vec<HeaderRule>,
}

impl HeaderRules {
    /// Check whether the headers leave the request protected.
    pub fn protects(&self, headers: &HeaderMap) -> bool {
        let protected =
            self.protect.is_empty() || self.protect.iter().any(|rule| rule.matches(headers));
        protected && !self.bypasses(headers)
    }

    /// Check whether a protect rule matches and no bypass rule does.
    ///
    /// Such a request is checked whatever its method and content type.
    pub fn forces(&self, headers: &HeaderMap) -> bool {
        self.protect.iter().any(|rule| rule.matches(headers)) && !self.bypasses(headers)
    }

    fn bypasses(&self, headers: &HeaderMap) -> bool {
        self.bypass.iter().any(|rule| rule.matches(headers))
    }
}

/// Lowercased media type of the request, without parameters.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let media_type = value.split(';').next()?.trim();
    (!media_type.is_empty()).then(|| media_type.to_ascii_lowercase())
}

/// Decides whether a request needs CSRF verification.
#[derive(Clone, Debug)]
pub struct PolicyEngine {
    config: Arc<CsrfConfig>,
}

impl PolicyEngine {
    /// Create a policy engine over a shared configuration.
    pub fn new(config: Arc<CsrfConfig>) -> Self {
        Self { config }
    }

    /// Full filter decision.
    ///
    /// A request is checked when it is not CORS-trusted, is protected by
    /// route, and either matches a protect header rule or has a selected
    /// method and content type.
    pub fn should_check(&self, parts: &Parts) -> bool {
        if self.is_cors_bypassed(parts) {
            tracing::trace!(uri = %parts.uri, "CSRF check bypassed for CORS-trusted request");
            return false;
        }

        let selected = self.config.header_rules.forces(&parts.headers)
            || (self.method_selected(parts) && self.content_type_selected(parts));
        let check = selected && self.is_protected(parts);
        tracing::trace!(method = %parts.method, uri = %parts.uri, check, "CSRF policy decision");
        check
    }

    /// Decision for explicitly checked routes: method and content-type lists
    /// are ignored, CORS trust and route protection still apply.
    pub fn must_check(&self, parts: &Parts) -> bool {
        !self.is_cors_bypassed(parts) && self.is_protected(parts)
    }

    /// Check the method lists.
    pub fn method_selected(&self, parts: &Parts) -> bool {
        self.config
            .method_policy
            .selects(std::iter::once(parts.method.as_str()))
    }

    /// Check the content-type lists.
    pub fn content_type_selected(&self, parts: &Parts) -> bool {
        let media_type = media_type(&parts.headers);
        self.config
            .content_type_policy
            .selects(media_type.as_deref())
    }

    /// Header rules, route modifiers and the custom predicate.
    pub fn is_protected(&self, parts: &Parts) -> bool {
        let modifiers = parts.extensions.get::<RouteModifiers>();
        let by_modifier = self
            .config
            .route_modifiers
            .selects(modifiers.into_iter().flat_map(RouteModifiers::iter));

        by_modifier
            && self.config.header_rules.protects(&parts.headers)
            && (self.config.should_protect)(parts)
    }

    /// CORS trust bypass.
    pub fn is_cors_bypassed(&self, parts: &Parts) -> bool {
        self.config.bypass_cors_trusted_origins && parts.extensions.get::<CorsTrusted>().is_some()
    }
}
