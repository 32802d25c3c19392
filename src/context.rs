//! # Request Context
//!
//! The per-request value handed to handlers and middleware: the normalized method and path, the
//! captured path parameters, and (when a timeout is in effect) the deadline it must respect.

use crate::method::Method;
use crate::params::ParamBuffer;
use std::time::Instant;

/// Per-request context attached before a handler is invoked.
///
/// The matched parameter buffer is attached here under a stable accessor (`params`) rather than a
/// generic type-erased map, since path parameters are the only value the router itself ever
/// populates; any additional request-scoped data is the host's responsibility to carry alongside
/// this context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    params: ParamBuffer,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(method: Method, path: String, params: ParamBuffer) -> Self {
        RequestContext { method, path, params, deadline: None }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &ParamBuffer {
        &self.params
    }

    /// Consumes the context, handing back its parameter buffer so it can be returned to the pool
    /// (§4.6 step 9).
    pub fn into_params(self) -> ParamBuffer {
        self.params
    }

    /// The effective deadline for this request, if a timeout is in effect (§4.6 step 6).
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_method_path_and_params() {
        let mut params = ParamBuffer::default();
        params.add("id", "42");
        let ctx = RequestContext::new(Method::Get, "/users/42".to_string(), params);
        assert_eq!(ctx.method(), Method::Get);
        assert_eq!(ctx.path(), "/users/42");
        assert_eq!(ctx.params().get("id"), Some("42"));
        assert!(ctx.deadline().is_none());
    }
}
