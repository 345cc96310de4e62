//! # csrfguard
//!
//! CSRF protection for Tower services.
//!
//! [`CsrfLayer`] verifies that state-changing requests carry the token that
//! was issued to the client, and issues a token when there is none. Tokens
//! are read from a header, the query string, or a url-encoded / multipart
//! form body; the expected token lives in a cookie or in the [`Session`]
//! attached to the request by an upstream session layer.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use csrfguard::{Csrf, CsrfConfig, CsrfLayer};
//! use tower::ServiceBuilder;
//!
//! let csrf = Csrf::builder(CsrfConfig::new().cookie_name("XSRF-TOKEN"))
//!     .secret(std::env::var("CSRF_SECRET")?)
//!     .build()?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CsrfLayer::new(csrf))
//!     .service(app);
//! ```
//!
//! Handlers read the current token with [`get_token`] to embed it in forms:
//!
//! ```rust,ignore
//! async fn form(req: Request<BoxBody>) -> Result<Response<Full<Bytes>>, Infallible> {
//!     let token = csrfguard::get_token(req.extensions()).expect("token");
//!     let html = format!(r#"<input type="hidden" name="{}" value="{}">"#, token.name(), token);
//!     Ok(Response::new(Full::new(Bytes::from(html))))
//! }
//! ```
//!
//! ## Configuration from the environment
//!
//! [`Csrf::from_env`] loads `CSRF_*` variables (and a `.env` file if present),
//! for example `CSRF_SECRET`, `CSRF_COOKIE_NAME` or
//! `CSRF_PROTECT_HEADERS=Cookie=*,Authorization=*`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod body;
mod layer;

pub use body::{BoxBody, BoxError};
pub use layer::{CsrfLayer, CsrfService};

pub use csrfguard_core::{
    get_token, BoxFuture, ConfigError, CorsTrusted, Csrf, CsrfBuilder, CsrfConfig, CsrfSettings,
    CsrfToken, ErrorHandler, ErrorResponse, ForbiddenHandler, HeaderRule, ListPolicy, Mode,
    Reason, RouteModifiers, Session, TokenProvider,
};

/// Everything needed to mount CSRF protection.
pub mod prelude {
    pub use crate::{
        get_token, CorsTrusted, Csrf, CsrfConfig, CsrfLayer, CsrfToken, RouteModifiers, Session,
    };
}
