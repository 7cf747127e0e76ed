//! Inbound command surface.
//!
//! The chat gateway hands over structured commands and renders the returned
//! text; everything leaving [`dispatch`] has already passed the sanitizer.

pub mod handlers;

use crate::context::AppContext;
use crate::pipeline::ProgressFn;
use crate::ratelimit::RateDecision;
use crate::sanitize;

/// An uploaded file as the chat platform presents it: a fetch URL plus the
/// original filename.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub enum Command {
    Login {
        token: String,
    },
    Logout,
    Whoami,
    ListRepositories,
    Upload {
        repository: String,
        attachment: Attachment,
        folder: Option<String>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Whoami => "whoami",
            Command::ListRepositories => "list_repositories",
            Command::Upload { .. } => "upload",
        }
    }
}

/// Admits the command through the rate governor, runs the matching handler,
/// and renders the outcome as sanitized user-facing text.
pub async fn dispatch(
    ctx: &AppContext,
    identity: &str,
    command: Command,
    progress: Option<&ProgressFn>,
) -> String {
    if let RateDecision::Denied { retry_after_secs } = ctx.governor.check(identity) {
        return format!("Slow down — try again in {retry_after_secs}s.");
    }

    tracing::info!(identity, command = command.name(), "handling command");
    let result = match command {
        Command::Login { token } => handlers::login(ctx, identity, &token).await,
        Command::Logout => handlers::logout(ctx, identity).await,
        Command::Whoami => handlers::whoami(ctx, identity).await,
        Command::ListRepositories => handlers::list_repositories(ctx, identity).await,
        Command::Upload {
            repository,
            attachment,
            folder,
        } => {
            handlers::upload(
                ctx,
                identity,
                &repository,
                &attachment,
                folder.as_deref(),
                progress,
            )
            .await
        }
    };

    match result {
        Ok(reply) => sanitize::sanitize_message(&reply),
        Err(e) => sanitize::sanitize_error(&e),
    }
}
