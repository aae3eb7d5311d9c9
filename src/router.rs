//! Path-prefix request router.
//!
//! Routes are kept in registration order and scanned front to back; the
//! first prefix that the request path starts with wins. There is no
//! longest-match ranking, so register specific prefixes before general ones.

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{Handler, SharedHandler};
use crate::http::request::Request;
use crate::http::response::Response;

#[derive(Default, Clone)]
pub struct Router {
    routes: Vec<(String, SharedHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route; earlier registrations take precedence.
    pub fn register(&mut self, prefix: impl Into<String>, handler: impl Handler) -> &mut Self {
        self.routes.push((prefix.into(), Arc::new(handler)));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn route(mut self, prefix: impl Into<String>, handler: impl Handler) -> Self {
        self.register(prefix, handler);
        self
    }

    /// The first registered route whose prefix matches `path`.
    pub fn find(&self, path: &str) -> Option<(&str, &SharedHandler)> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, handler)| (prefix.as_str(), handler))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(prefix, _)| prefix.as_str())
    }
}

#[async_trait]
impl Handler for Router {
    async fn call(&self, request: Request) -> anyhow::Result<Response> {
        match self.find(request.path()) {
            Some((prefix, handler)) => {
                tracing::trace!(prefix, path = %request.path(), "Route matched");
                handler.call(request).await
            }
            None => {
                tracing::debug!(path = %request.path(), "No route matched");
                Ok(Response::not_found())
            }
        }
    }
}
