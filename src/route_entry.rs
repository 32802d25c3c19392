//! # Route Entry
//!
//! What C2 and C3 actually store at a terminal node. Beyond the handler itself, a registered
//! route can carry dispatch policy attached by the builder `Router::get`/`post`/etc. returns
//! (§4.5, §6): extra middleware layered inside the router-wide chain, a per-route timeout
//! override, and a per-route error handler override. Baking these onto the stored entry rather
//! than threading a side lookup through C2/C3 keeps C6's post-match step a single field read.

use crate::fallback::ErrorHandlerArc;
use crate::handler::{HandlerArc, MiddlewareArc};
use std::sync::Arc;
use std::time::Duration;

/// Everything the lifecycle controller needs once a request resolves to a route.
pub struct RouteEntry {
    pub handler: HandlerArc,
    /// Route- and group-specific middleware, already combined in outer-to-inner order. Wraps
    /// inside the router-wide `use` snapshot, not instead of it (§4.6 step 7).
    pub middleware: Vec<MiddlewareArc>,
    /// `None` defers to the router's configured default (§6).
    pub timeout: Option<Duration>,
    /// `None` defers to the router's default error handler (§4.6 step 8).
    pub error_handler: Option<ErrorHandlerArc>,
}

pub type RouteArc = Arc<RouteEntry>;

impl RouteEntry {
    pub fn plain(handler: HandlerArc) -> RouteArc {
        Arc::new(RouteEntry { handler, middleware: Vec::new(), timeout: None, error_handler: None })
    }
}
