//! # Triegate
//!
//! An embeddable HTTP request router: a double-array trie for static paths, a per-method radix
//! tree for named and regex path segments, a sharded resolution cache in front of both, and a
//! request lifecycle controller that ties matching, middleware, timeouts, and graceful shutdown
//! together.
//!
//! ## Architecture
//!
//! The router is built from six components:
//! - **Handlers and middleware** ([`Handler`], [`Middleware`]): the user-supplied request logic,
//!   treated as opaque by everything else in the crate.
//! - **Static trie** (internal, one per HTTP method): matches fully literal patterns.
//! - **Dynamic tree** (internal, one per HTTP method): matches patterns with named or regex
//!   segments, with literal-first/named-second/regex-third backtracking.
//! - **Resolution cache** (internal): memoizes `(method, path) -> route` lookups behind a
//!   fingerprint, with LRU eviction and a background TTL sweep.
//! - **Router facade** ([`Router`], [`Group`], [`RouteHandle`]): registration and build.
//! - **Lifecycle controller** (`Router::serve`, `Router::shutdown`): the per-request dispatch path
//!   and graceful drain.
//!
//! ## Usage
//!
//! ```
//! use triegate::{FnHandler, Method, Router};
//!
//! # fn doctest() -> triegate::Result<()> {
//! let router = Router::new();
//! router.get("/users/{id}", FnHandler::new(|ctx, res| {
//!     res.write(200, ctx.params().get("id").unwrap_or("?").to_string());
//!     Ok(())
//! }));
//! router.build()?;
//! # Ok(())
//! # }
//! ```
//!
//! Registration (`get`/`post`/.../`group`) only ever defers; nothing is installed until
//! [`Router::build`] runs. Once built, a host calls [`Router::serve`] once per inbound request.

mod cache;
mod context;
mod dynamic_tree;
mod error;
mod fallback;
mod handler;
mod lifecycle;
mod method;
mod params;
mod pattern;
mod route_entry;
mod router;
mod static_trie;

pub use context::RequestContext;
pub use error::{Result, RouterError};
pub use fallback::{
    DefaultErrorHandler, DefaultShutdownHandler, DefaultTimeoutHandler, ErrorHandler,
    ErrorHandlerArc, FallbackHandler, FallbackHandlerArc,
};
pub use handler::{FnHandler, Handler, HandlerArc, HandlerError, Middleware, MiddlewareArc, ResponseSink};
pub use method::Method;
pub use params::{ParamBuffer, ParamPool};
pub use router::{Group, Router, RouteHandle, RouterOptions};
