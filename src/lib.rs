//! Repodrop — secure archive-to-repository publisher core.
//!
//! A chat-platform user authenticates with a personal access token, then
//! uploads a ZIP archive whose entries are validated, sanitized, and written
//! file-by-file into a target repository on the hosting service. The chat
//! gateway and process bootstrap live outside this crate; they construct an
//! [`AppContext`] and feed [`commands::dispatch`].

pub mod archive;
pub mod commands;
pub mod config;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod hosting;
pub mod pipeline;
pub mod ratelimit;
pub mod sanitize;

pub use context::AppContext;
pub use errors::AppError;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the tracing subscriber. The external bootstrap calls this once
/// before building the context.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "repodrop=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
