//! Accepting connections and wiring the configured routes.

pub mod listener;

use crate::config::Config;
use crate::files::DirectoryTreeHandler;
use crate::fs::DirectoryTree;
use crate::router::Router;

pub use listener::{Listener, Server};

/// Builds the router described by `cfg`.
pub fn router_from_config(cfg: &Config) -> Router {
    let mut router = Router::new();

    if let Some(files) = &cfg.static_files {
        let mut handler = DirectoryTreeHandler::new(DirectoryTree::new(&files.root));
        for (k, v) in &files.headers {
            handler = handler.with_header(k, v);
        }
        if files.strip_prefix {
            handler = handler.strip_prefix(files.mount.trim_end_matches('/'));
        }

        tracing::info!(mount = %files.mount, root = %files.root.display(), "Serving static files");
        router.register(files.mount.clone(), handler);
    }

    router
}
