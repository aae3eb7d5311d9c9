//! The seam between the protocol engine and application code.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::request::Request;
use crate::http::response::Response;

/// Application logic invoked once per request.
///
/// An `Err` is turned into a `500` response by the connection.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, request: Request) -> anyhow::Result<Response>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    async fn call(&self, request: Request) -> anyhow::Result<Response> {
        (self)(request).await
    }
}

pub type SharedHandler = Arc<dyn Handler>;
