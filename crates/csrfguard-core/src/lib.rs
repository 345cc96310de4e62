//! # csrfguard-core
//!
//! Framework-independent CSRF protection: decides which requests need a
//! token, generates and signs tokens, finds the expected token in a cookie
//! or the session, finds the presented token in a header, the query string
//! or a form body, and compares the two.
//!
//! Host bindings (see the `csrfguard` crate for Tower) drive a [`Csrf`]
//! engine once per request. Nothing in this crate touches the network or
//! owns a body stream; body inspection works on a bounded prefix the host
//! buffers.
//!
//! ## Quick start
//!
//! ```rust
//! use csrfguard_core::{Csrf, CsrfConfig, Verdict};
//! use http::{Method, Request};
//!
//! let csrf = Csrf::builder(CsrfConfig::new().cookie_name("XSRF-TOKEN"))
//!     .secret("0123456789abcdef0123456789abcdef")
//!     .build()
//!     .unwrap();
//!
//! let (parts, _) = Request::builder()
//!     .method(Method::POST)
//!     .uri("/transfer")
//!     .body(())
//!     .unwrap()
//!     .into_parts();
//!
//! // no token stored, so the request is rejected
//! assert!(matches!(csrf.begin(&parts), Verdict::Failed(_)));
//! ```
//!
//! ## Configuration
//!
//! [`CsrfConfig`] is built in code; [`CsrfSettings`] reads the same options
//! from `CSRF_*` environment variables.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod body;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod policy;
pub mod session;
pub mod settings;
pub mod store;
pub mod tags;
pub mod token;
pub mod verify;

pub use body::FormKind;
pub use config::{accepts_html, CsrfConfig, RequestPredicate};
pub use engine::{Csrf, CsrfBuilder};
pub use error::{ConfigError, Result};
pub use handler::{BoxFuture, ErrorHandler, ErrorResponse, ForbiddenHandler};
pub use policy::{HeaderMatch, HeaderRule, HeaderRules, ListPolicy, PolicyEngine};
pub use session::Session;
pub use settings::CsrfSettings;
pub use store::{is_cacheable, Lookup, TokenSource, TokenStore};
pub use tags::{CorsTrusted, RouteModifiers};
pub use token::{
    constant_time_eq, generate_raw, get_token, CsrfToken, SignedTokenProvider, TokenProvider,
    TokenSigner, UnsignedTokenProvider,
};
pub use verify::{BodyCheck, Failure, Mode, Passed, Reason, State, Verdict};
