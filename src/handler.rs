//! # Handlers, Middleware, and the Response Sink
//!
//! The router treats handlers and middleware as opaque, user-supplied logic: it invokes them and
//! inspects only whether a response was written, never the error payload itself. This mirrors the
//! `ProxyHttp` trait from the reference gateway (`app::gateway::GatewayApp`), which is driven the
//! same way by an external framework without that framework inspecting handler internals.

use crate::context::RequestContext;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque error type returned by handlers. The router never introspects it — it only checks
/// whether a response was written before deciding whether to invoke the error handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A sink the router hands to handlers and middleware to write a response into.
///
/// Wrapped so that "written" state is observable: this single bit is what lets the lifecycle
/// controller (C6) avoid a double write across a timeout-vs-handler race (§4.6).
#[derive(Debug, Default)]
pub struct ResponseSink {
    written: AtomicBool,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `write` has been called, by any handler, middleware, or the router's own
    /// fallback paths (404/503/500/504).
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// Appends a response header. May be called before the body is written (most middleware
    /// usage) without marking the sink as written.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Writes the final status and body. Marks the sink as written; if it was already written
    /// (e.g. a timeout already fired) this call is a no-op, matching the single-write guarantee.
    pub fn write(&mut self, status: u16, body: impl Into<Vec<u8>>) {
        if self.written.swap(true, Ordering::AcqRel) {
            return;
        }
        self.status = Some(status);
        self.body = body.into();
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A user-registered request handler.
///
/// Handlers are invoked once per matched request with the resolved [`RequestContext`] (carrying
/// captured path parameters) and a [`ResponseSink`] to write the response into.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &RequestContext, res: &mut ResponseSink) -> Result<(), HandlerError>;
}

/// Shared, cloneable handle to a registered handler.
pub type HandlerArc = Arc<dyn Handler>;

/// Wraps a synchronous closure as a [`Handler`], for the common case where handler logic does
/// not itself need to `.await` anything.
pub struct FnHandler<F>(F)
where
    F: Fn(&RequestContext, &mut ResponseSink) -> Result<(), HandlerError> + Send + Sync;

impl<F> FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseSink) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(FnHandler(f))
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseSink) -> Result<(), HandlerError> + Send + Sync,
{
    async fn call(&self, ctx: &RequestContext, res: &mut ResponseSink) -> Result<(), HandlerError> {
        (self.0)(ctx, res)
    }
}

impl<F> fmt::Debug for FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseSink) -> Result<(), HandlerError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// A transformation from a handler to a handler.
///
/// Ordering is outer-to-inner in registration order: the first registered middleware is the
/// outermost wrapper (§3 Data Model). `wrap` receives the next handler in the chain (either the
/// final route handler or the next-inner middleware) and returns a new handler that runs its own
/// logic before and after delegating to `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &RequestContext,
        res: &mut ResponseSink,
        next: &HandlerArc,
    ) -> Result<(), HandlerError>;
}

pub type MiddlewareArc = Arc<dyn Middleware>;

/// Binds one middleware to the handler it wraps, so the resulting value itself implements
/// [`Handler`] and chains can be built as `middleware.wrap(next)`.
struct MiddlewareHandler {
    middleware: MiddlewareArc,
    next: HandlerArc,
}

#[async_trait]
impl Handler for MiddlewareHandler {
    async fn call(&self, ctx: &RequestContext, res: &mut ResponseSink) -> Result<(), HandlerError> {
        self.middleware.handle(ctx, res, &self.next).await
    }
}

/// Builds the effective handler for one request: takes the middleware snapshot (outer-to-inner
/// order) and the final route handler, and folds from last to first so that the first-registered
/// middleware ends up as the outermost wrapper (§4.6 step 7).
pub fn build_chain(middlewares: &[MiddlewareArc], final_handler: HandlerArc) -> HandlerArc {
    let mut chain = final_handler;
    for middleware in middlewares.iter().rev() {
        chain = Arc::new(MiddlewareHandler { middleware: Arc::clone(middleware), next: chain });
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::params::ParamBuffer;
    use std::sync::atomic::AtomicUsize;

    fn ctx() -> RequestContext {
        RequestContext::new(Method::Get, "/x".to_string(), ParamBuffer::default())
    }

    struct OrderMiddleware {
        tag: &'static str,
    }

    #[async_trait]
    impl Middleware for OrderMiddleware {
        async fn handle(
            &self,
            ctx: &RequestContext,
            res: &mut ResponseSink,
            next: &HandlerArc,
        ) -> Result<(), HandlerError> {
            let existing = res.header("X-Order").unwrap_or("").to_string();
            let pre = if existing.is_empty() {
                self.tag.to_string()
            } else {
                format!("{existing},{}", self.tag)
            };
            res.set_header("X-Order", pre);
            next.call(ctx, res).await
        }
    }

    #[tokio::test]
    async fn middleware_runs_outer_to_inner() {
        let m1: MiddlewareArc = Arc::new(OrderMiddleware { tag: "first" });
        let m2: MiddlewareArc = Arc::new(OrderMiddleware { tag: "second" });
        let handler = FnHandler::new(|_, res| {
            res.write(200, "ok");
            Ok(())
        });
        let chain = build_chain(&[m1, m2], handler);

        let mut res = ResponseSink::new();
        chain.call(&ctx(), &mut res).await.unwrap();
        assert_eq!(res.header("X-Order"), Some("first,second"));
    }

    #[tokio::test]
    async fn response_sink_ignores_second_write() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let handler = FnHandler::new(move |_, res| {
            count2.fetch_add(1, Ordering::SeqCst);
            res.write(200, "first");
            res.write(500, "second");
            Ok(())
        });
        let mut res = ResponseSink::new();
        handler.call(&ctx(), &mut res).await.unwrap();
        assert_eq!(res.status(), Some(200));
        assert_eq!(res.body(), b"first");
    }
}
