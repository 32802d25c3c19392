//! # Fallback Handlers
//!
//! The router's own response paths — the error handler, the timeout handler and the shutdown
//! handler — take the same shape as a [`Handler`](crate::handler::Handler) but need an extra
//! argument (the error handler also receives the failure) and are expected to always write a
//! response rather than optionally error out themselves. Keeping them as distinct traits from
//! `Handler` avoids an `Option<HandlerError>` parameter nobody but these three callers would use.

use crate::context::RequestContext;
use crate::handler::{HandlerError, ResponseSink};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, err: HandlerError, ctx: &RequestContext, res: &mut ResponseSink);
}

pub type ErrorHandlerArc = Arc<dyn ErrorHandler>;

/// Shared shape for the timeout and shutdown handlers: no error payload, just a chance to write
/// a response before the router falls back to its own default status code.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, res: &mut ResponseSink);
}

pub type FallbackHandlerArc = Arc<dyn FallbackHandler>;

pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle(&self, err: HandlerError, _ctx: &RequestContext, res: &mut ResponseSink) {
        log::warn!("unhandled handler error, degrading to 500: {err}");
        res.write(500, "internal server error");
    }
}

pub struct DefaultTimeoutHandler;

#[async_trait]
impl FallbackHandler for DefaultTimeoutHandler {
    async fn handle(&self, ctx: &RequestContext, res: &mut ResponseSink) {
        log::warn!("request timed out: {} {}", ctx.method(), ctx.path());
        res.write(504, "request timed out");
    }
}

pub struct DefaultShutdownHandler;

#[async_trait]
impl FallbackHandler for DefaultShutdownHandler {
    async fn handle(&self, _ctx: &RequestContext, res: &mut ResponseSink) {
        res.write(503, "server is shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::params::ParamBuffer;

    fn ctx() -> RequestContext {
        RequestContext::new(Method::Get, "/x".to_string(), ParamBuffer::default())
    }

    #[tokio::test]
    async fn default_error_handler_writes_500() {
        let mut res = ResponseSink::new();
        DefaultErrorHandler.handle("boom".into(), &ctx(), &mut res).await;
        assert_eq!(res.status(), Some(500));
    }

    #[tokio::test]
    async fn default_timeout_handler_writes_504() {
        let mut res = ResponseSink::new();
        DefaultTimeoutHandler.handle(&ctx(), &mut res).await;
        assert_eq!(res.status(), Some(504));
    }

    #[tokio::test]
    async fn default_shutdown_handler_writes_503() {
        let mut res = ResponseSink::new();
        DefaultShutdownHandler.handle(&ctx(), &mut res).await;
        assert_eq!(res.status(), Some(503));
    }
}
