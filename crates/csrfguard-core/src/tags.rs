//! Request tags set by upstream layers
//!
//! These markers live in the request extensions. The CSRF policy reads them
//! but never creates them.

/// Marks a request whose origin an upstream CORS filter has already trusted.
///
/// With `bypass_cors_trusted_origins` enabled, such requests skip CSRF
/// checking entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsTrusted {
    origin: String,
}

impl CorsTrusted {
    /// Tag a request as coming from the trusted `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// The trusted origin.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Modifier tags attached to the matched route (e.g. `nocsrf`).
///
/// Routers stamp this on the request so the route modifier policy can exempt
/// or opt in individual routes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteModifiers(Vec<String>);

impl RouteModifiers {
    /// Create a modifier set.
    pub fn new<I, S>(modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(modifiers.into_iter().map(Into::into).collect())
    }

    /// Check for a modifier, ignoring ASCII case.
    pub fn contains(&self, modifier: &str) -> bool {
        self.0.iter().any(|m| m.eq_ignore_ascii_case(modifier))
    }

    /// Iterate over the modifiers.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
