//! # Request Lifecycle Controller (C6)
//!
//! `Router::serve` is the single entry point a host calls per inbound request; `Router::shutdown`
//! begins a graceful drain. Both live here rather than in `router.rs` because they orchestrate
//! the other components (C1, C2/C3, C4) rather than owning state themselves — the same split the
//! reference gateway draws between its app object and its per-request dispatch path.

use crate::context::RequestContext;
use crate::fallback::ErrorHandlerArc;
use crate::handler::{build_chain, HandlerArc, MiddlewareArc, ResponseSink};
use crate::method::Method;
use crate::params::ParamBuffer;
use crate::route_entry::RouteArc;
use crate::router::Router;
use futures::FutureExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decrements `in_flight` on every exit path out of [`Router::serve`], mirroring the counter
/// discipline the reference gateway's worker loop applies around each accepted connection.
struct InFlightGuard(Arc<crate::router::RouterInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Router {
    /// Resolves `(method, path)` to a handler and response. Implements the nine-step flow: the
    /// shutdown check, in-flight tracking, cache/matcher resolution, timeout enforcement, the
    /// middleware chain, and error-handler panic recovery.
    pub async fn serve(&self, method: Method, path: &str) -> ResponseSink {
        let inner = Arc::clone(&self.0);
        let mut res = ResponseSink::new();

        if inner.shutting_down.load(Ordering::Acquire) {
            let ctx = RequestContext::new(method, path.to_string(), ParamBuffer::default());
            let handler = Arc::clone(&*inner.shutdown_handler.read().unwrap());
            handler.handle(&ctx, &mut res).await;
            return res;
        }

        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let _guard = InFlightGuard(Arc::clone(&inner));

        let normalized = crate::pattern::normalize_path(path);
        let resolved = self.resolve(method, &normalized);

        let (route, params) = match resolved {
            Some(found) => found,
            None => {
                res.write(404, "not found");
                return res;
            }
        };

        let mut buffer = inner.params.acquire();
        for (name, value) in &params {
            buffer.add(name.clone(), value.clone());
        }
        let mut ctx = RequestContext::new(method, normalized, buffer);

        let timeout = route.timeout.unwrap_or(inner.default_timeout);
        if timeout > Duration::ZERO {
            ctx.set_deadline(Instant::now() + timeout);
        }

        let chain = self.effective_handler(&route);
        if timeout > Duration::ZERO {
            tokio::select! {
                result = chain.call(&ctx, &mut res) => {
                    if let Err(err) = result {
                        self.run_error_handler(&route, err, &ctx, &mut res).await;
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    if !res.is_written() {
                        let handler = Arc::clone(&*inner.timeout_handler.read().unwrap());
                        handler.handle(&ctx, &mut res).await;
                    }
                }
            }
        } else {
            let result = chain.call(&ctx, &mut res).await;
            if let Err(err) = result {
                self.run_error_handler(&route, err, &ctx, &mut res).await;
            }
        }

        inner.params.release(ctx.into_params());
        res
    }

    /// Begins graceful shutdown: flips the shutting-down flag (§5 ordering guarantee (c)) and
    /// waits for `in_flight` to reach zero or `deadline` to elapse, whichever comes first.
    pub async fn shutdown(&self, deadline: Duration) {
        self.0.shutting_down.store(true, Ordering::Release);
        let wait = async {
            while self.0.in_flight.load(Ordering::Acquire) > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            log::warn!(
                "shutdown deadline elapsed with {} request(s) still in flight",
                self.0.in_flight.load(Ordering::Acquire)
            );
        }
    }

    fn resolve(&self, method: Method, normalized_path: &str) -> Option<(RouteArc, Vec<(String, String)>)> {
        let key = crate::cache::fingerprint(method, normalized_path);
        if let Some(hit) = self.0.cache.get(key) {
            return Some(hit);
        }

        if let Some(route) = self.lookup_static(method, normalized_path) {
            self.0.cache.put(key, Arc::clone(&route), Vec::new());
            return Some((route, Vec::new()));
        }

        let segments: Vec<&str> = if normalized_path == "/" {
            Vec::new()
        } else {
            normalized_path.trim_start_matches('/').split('/').collect()
        };
        let mut buffer = self.0.params.acquire();
        let found = self.lookup_dynamic(method, &segments, &mut buffer);
        let result = found.map(|route| {
            let snapshot: Vec<(String, String)> =
                buffer.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect();
            (route, snapshot)
        });
        self.0.params.release(buffer);

        if let Some((route, params)) = &result {
            self.0.cache.put(key, Arc::clone(route), params.clone());
        }
        result
    }

    /// Folds the router-wide `use` snapshot, the always-run cleanup layer, and the route's own
    /// middleware into one handler, outermost first (§4.6 step 7).
    fn effective_handler(&self, route: &RouteArc) -> HandlerArc {
        let mut combined: Vec<MiddlewareArc> = (*self.0.middleware.read().unwrap()).clone();
        combined.extend((*self.cleanup_middleware()).clone());
        combined.extend(route.middleware.iter().cloned());
        build_chain(&combined, Arc::clone(&route.handler))
    }

    /// Per-route override ▸ router default (§4.6 step 8). Recovers from a panicking error handler
    /// by degrading to a plain 500, never letting a handler bug take down the serving task.
    async fn run_error_handler(
        &self,
        route: &RouteArc,
        err: crate::handler::HandlerError,
        ctx: &RequestContext,
        res: &mut ResponseSink,
    ) {
        if res.is_written() {
            return;
        }
        let handler: ErrorHandlerArc = route
            .error_handler
            .clone()
            .unwrap_or_else(|| Arc::clone(&*self.0.error_handler.read().unwrap()));

        let outcome =
            std::panic::AssertUnwindSafe(handler.handle(err, ctx, res)).catch_unwind().await;
        if outcome.is_err() {
            log::error!("error handler panicked, degrading to 500");
            res.write(500, "internal server error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::fallback::FallbackHandler;
    use crate::handler::FnHandler;
    use crate::method::Method;
    use crate::router::{Router, RouterOptions};
    use async_trait::async_trait;

    #[tokio::test]
    async fn serves_static_route() {
        let router = Router::new();
        router.get(
            "/hello",
            FnHandler::new(|_, res| {
                res.write(200, "world");
                Ok(())
            }),
        );
        router.build().unwrap();

        let res = router.serve(Method::Get, "/hello").await;
        assert_eq!(res.status(), Some(200));
        assert_eq!(res.body(), b"world");
    }

    #[tokio::test]
    async fn serves_dynamic_route_with_captured_params() {
        let router = Router::new();
        router.get(
            "/users/{id}",
            FnHandler::new(|ctx, res| {
                res.write(200, ctx.params().get("id").unwrap_or("?"));
                Ok(())
            }),
        );
        router.build().unwrap();

        let res = router.serve(Method::Get, "/users/42").await;
        assert_eq!(res.body(), b"42");
    }

    #[tokio::test]
    async fn unmatched_path_returns_404() {
        let router = Router::new();
        router.build().unwrap();
        let res = router.serve(Method::Get, "/missing").await;
        assert_eq!(res.status(), Some(404));
    }

    #[tokio::test]
    async fn cache_hit_reuses_first_resolution() {
        let router = Router::new();
        router.get(
            "/users/{id}",
            FnHandler::new(|ctx, res| {
                res.write(200, ctx.params().get("id").unwrap_or("?"));
                Ok(())
            }),
        );
        router.build().unwrap();

        let first = router.serve(Method::Get, "/users/7").await;
        let second = router.serve(Method::Get, "/users/7").await;
        assert_eq!(first.body(), b"7");
        assert_eq!(second.body(), b"7");
    }

    #[tokio::test]
    async fn handler_error_invokes_error_handler() {
        let router = Router::new();
        router.get(
            "/boom",
            FnHandler::new(|_, _res| Err("kaboom".into())),
        );
        router.build().unwrap();

        let res = router.serve(Method::Get, "/boom").await;
        assert_eq!(res.status(), Some(500));
    }

    struct PanicyErrorHandler;

    #[async_trait]
    impl crate::fallback::ErrorHandler for PanicyErrorHandler {
        async fn handle(&self, _err: crate::handler::HandlerError, _ctx: &RequestContext, _res: &mut ResponseSink) {
            panic!("error handler itself is broken");
        }
    }

    #[tokio::test]
    async fn panicking_error_handler_degrades_to_500() {
        let router = Router::new();
        router.set_error_handler(Arc::new(PanicyErrorHandler));
        router.get("/boom", FnHandler::new(|_, _res| Err("kaboom".into())));
        router.build().unwrap();

        let res = router.serve(Method::Get, "/boom").await;
        assert_eq!(res.status(), Some(500));
    }

    struct SlowHandler(Duration);

    #[async_trait]
    impl crate::handler::Handler for SlowHandler {
        async fn call(
            &self,
            _ctx: &RequestContext,
            res: &mut ResponseSink,
        ) -> Result<(), crate::handler::HandlerError> {
            tokio::time::sleep(self.0).await;
            res.write(200, "finished");
            Ok(())
        }
    }

    #[tokio::test]
    async fn timeout_fires_when_handler_outlives_deadline() {
        let router = Router::new_with(RouterOptions {
            request_timeout: Duration::from_millis(10),
            ..Default::default()
        });
        router.handle(Method::Get, "/slow", Arc::new(SlowHandler(Duration::from_millis(100))));
        router.build().unwrap();

        let res = router.serve(Method::Get, "/slow").await;
        assert_eq!(res.status(), Some(504));
    }

    #[tokio::test]
    async fn shutdown_rejects_subsequent_requests() {
        let router = Router::new();
        router.get("/x", FnHandler::new(|_, res| {
            res.write(200, "ok");
            Ok(())
        }));
        router.build().unwrap();

        router.shutdown(Duration::from_millis(50)).await;
        let res = router.serve(Method::Get, "/x").await;
        assert_eq!(res.status(), Some(503));
    }

    struct CustomTimeoutHandler;

    #[async_trait]
    impl FallbackHandler for CustomTimeoutHandler {
        async fn handle(&self, _ctx: &RequestContext, res: &mut ResponseSink) {
            res.write(599, "custom timeout");
        }
    }

    #[tokio::test]
    async fn custom_timeout_handler_overrides_default_status() {
        let router = Router::new_with(RouterOptions {
            request_timeout: Duration::from_millis(5),
            ..Default::default()
        });
        router.set_timeout_handler(Arc::new(CustomTimeoutHandler));
        router.handle(Method::Get, "/slow", Arc::new(SlowHandler(Duration::from_millis(50))));
        router.build().unwrap();

        let res = router.serve(Method::Get, "/slow").await;
        assert_eq!(res.status(), Some(599));
    }
}
