//! Spindle - minimal streaming HTTP/1.1 server core
//!
//! Turns a byte stream into a request, hands it to a [`handler::Handler`]
//! and writes the response back. Ships a prefix [`router::Router`] and a
//! byte-range aware static file handler.

pub mod config;
pub mod files;
pub mod fs;
pub mod handler;
pub mod http;
pub mod router;
pub mod server;
