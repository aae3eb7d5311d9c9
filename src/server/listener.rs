use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, info};

use crate::config::ServerConfig;
use crate::handler::{Handler, SharedHandler};
use crate::http::connection::{Connection, ConnectionSettings};

/// A source of incoming connections.
#[async_trait]
pub trait Listener: Send {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// The next connection and a printable peer name.
    ///
    /// `Ok(None)` means the source is exhausted and the server should stop.
    async fn accept(&mut self) -> io::Result<Option<(Self::Stream, String)>>;
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<Option<(TcpStream, String)>> {
        let (socket, peer) = TcpListener::accept(self).await?;
        Ok(Some((socket, peer.to_string())))
    }
}

/// Connections handed over through a channel; ends when all senders drop.
#[async_trait]
impl<S> Listener for mpsc::Receiver<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Stream = S;

    async fn accept(&mut self) -> io::Result<Option<(S, String)>> {
        Ok(self.recv().await.map(|stream| (stream, "channel".to_string())))
    }
}

/// Accept loop that runs one task per connection.
///
/// Live connections are tracked so shutdown can wait for them, and bounded
/// by a semaphore: at the limit the loop stops accepting until a
/// connection finishes.
pub struct Server {
    handler: SharedHandler,
    settings: ConnectionSettings,
    max_connections: usize,
    shutdown_grace: Duration,
}

impl Server {
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            settings: ConnectionSettings::default(),
            max_connections: 1024,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn from_config(cfg: &ServerConfig, handler: impl Handler) -> Self {
        Self::new(handler)
            .with_settings(cfg.connection_settings())
            .max_connections(cfg.max_connections)
            .shutdown_grace(cfg.shutdown_grace())
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Serves until the listener is exhausted.
    pub async fn serve<L: Listener>(&self, listener: L) -> anyhow::Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serves until `shutdown` resolves or the listener is exhausted, then
    /// waits up to the grace period for open connections before aborting them.
    pub async fn serve_with_shutdown<L, F>(&self, mut listener: L, shutdown: F) -> anyhow::Result<()>
    where
        L: Listener,
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(self.max_connections));
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            while let Some(res) = tasks.try_join_next() {
                log_task_result(res);
            }

            let permit = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; no longer accepting connections");
                    break;
                }
                permit = permits.clone().acquire_owned() => permit?,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(Some(conn)) => conn,
                Ok(None) => {
                    info!("Listener closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            tracing::debug!(peer = %peer, active = tasks.len() + 1, "Accepted connection");

            let conn = Connection::new(stream, Arc::clone(&self.handler), self.settings.clone());
            let span = tracing::info_span!("conn", peer = %peer);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    if let Err(e) = conn.run().await {
                        tracing::debug!(error = %e, "Connection closed with error");
                    }
                }
                .instrument(span),
            );
        }

        self.drain(tasks).await;
        Ok(())
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        info!(active = tasks.len(), "Waiting for open connections");
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(res) = tasks.join_next().await {
                log_task_result(res);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "Grace period elapsed; aborting connections");
            tasks.shutdown().await;
        }
    }
}

fn log_task_result(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(error = %e, "Connection task panicked");
        }
    }
}
