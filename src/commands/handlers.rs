//! Command handlers: credential lifecycle and the upload pipeline.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Attachment;
use crate::archive;
use crate::context::AppContext;
use crate::errors::AppError;
use crate::hosting::RepoRef;
use crate::pipeline::{download, publish, ProgressFn};

/// Known personal-access-token shapes. Anything else is refused before a
/// single network call is made.
static TOKEN_FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:gh[pousr]_[A-Za-z0-9]{20,}|github_pat_[A-Za-z0-9_]{20,}|[0-9a-fA-F]{40})$")
        .unwrap()
});

const REPO_LIST_LIMIT: usize = 10;
const MAX_FAILURES_SHOWN: usize = 10;
const MAX_DROPPED_SHOWN: usize = 5;

pub async fn login(ctx: &AppContext, identity: &str, token: &str) -> Result<String, AppError> {
    if !TOKEN_FORMAT_RE.is_match(token.trim()) {
        return Err(AppError::Validation(
            "that does not look like a personal access token".into(),
        ));
    }
    let token = token.trim();

    let host_identity = ctx.hosting.verify_identity(token).await?;

    let missing: Vec<&String> = ctx
        .config
        .required_scopes
        .iter()
        .filter(|req| !scope_satisfied(&host_identity.scopes, req))
        .collect();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        return Err(AppError::Validation(format!(
            "token is missing required scope(s): {}. Generate a new token with those scopes \
             and log in again",
            names.join(", ")
        )));
    }

    ctx.store
        .save(identity, token, Some(host_identity.username.clone()))
        .await?;
    Ok(format!("Logged in as {}.", host_identity.username))
}

pub async fn logout(ctx: &AppContext, identity: &str) -> Result<String, AppError> {
    if ctx.store.remove(identity).await? {
        Ok("Logged out. Your stored credential was deleted.".into())
    } else {
        Ok("You were not logged in.".into())
    }
}

pub async fn whoami(ctx: &AppContext, identity: &str) -> Result<String, AppError> {
    match ctx.store.get_record(identity).await? {
        Some(record) => {
            let name = record.display_name.as_deref().unwrap_or("(name unknown)");
            Ok(format!(
                "You are {name}, logged in since {}.",
                record.registered_at.format("%Y-%m-%d %H:%M UTC")
            ))
        }
        None => Ok("You are not logged in. Use the login command first.".into()),
    }
}

pub async fn list_repositories(ctx: &AppContext, identity: &str) -> Result<String, AppError> {
    let Some(token) = ctx.store.get_decrypted(identity).await? else {
        return Ok("You are not logged in. Use the login command first.".into());
    };

    let repos = ctx
        .hosting
        .list_repositories(&token, REPO_LIST_LIMIT)
        .await?;
    if repos.is_empty() {
        return Ok("No repositories found for your account.".into());
    }

    let mut lines = vec!["Your most recently updated repositories:".to_string()];
    for repo in repos {
        let vis = if repo.private { " (private)" } else { "" };
        lines.push(format!("• {}{vis}", repo.full_name));
    }
    Ok(lines.join("\n"))
}

pub async fn upload(
    ctx: &AppContext,
    identity: &str,
    repository: &str,
    attachment: &Attachment,
    folder: Option<&str>,
    progress: Option<&ProgressFn>,
) -> Result<String, AppError> {
    let Some(token) = ctx.store.get_decrypted(identity).await? else {
        return Ok("You are not logged in. Use the login command first.".into());
    };

    if !attachment.filename.to_ascii_lowercase().ends_with(".zip") {
        return Err(AppError::Validation(
            "only .zip attachments are supported".into(),
        ));
    }

    let folder = match folder {
        Some(f) if !f.trim().is_empty() => {
            let normalized = archive::paths::normalize(f.trim())
                .map_err(|_| AppError::Validation(format!("'{f}' is not a valid target folder")))?;
            Some(normalized)
        }
        _ => None,
    };

    let repo = resolve_repo(ctx, identity, &token, repository).await?;

    let bytes = download::fetch(&ctx.http, &attachment.url, &ctx.config.limits).await?;
    let prepared = archive::prepare(&bytes, &ctx.config.limits)?;

    if prepared.entries.is_empty() {
        let mut reply = "The archive contained no publishable files.".to_string();
        append_dropped(&mut reply, &prepared.dropped);
        return Ok(reply);
    }

    let author = ctx
        .store
        .get_record(identity)
        .await?
        .and_then(|r| r.display_name)
        .unwrap_or_else(|| identity.to_string());

    let outcome = publish::publish(
        ctx.hosting.as_ref(),
        &token,
        &repo,
        folder.as_deref(),
        &prepared.entries,
        &author,
        &ctx.config.limits,
        progress,
    )
    .await?;

    let target = match &folder {
        Some(f) => format!("{repo}/{f}"),
        None => repo.to_string(),
    };
    let mut reply = format!(
        "Published {}/{} files to {target}.",
        outcome.succeeded, outcome.total
    );
    if !outcome.failures.is_empty() {
        reply.push_str("\nFailed:");
        for (path, reason) in outcome.failures.iter().take(MAX_FAILURES_SHOWN) {
            reply.push_str(&format!("\n• {path} — {reason}"));
        }
        if outcome.failures.len() > MAX_FAILURES_SHOWN {
            reply.push_str(&format!(
                "\n…and {} more",
                outcome.failures.len() - MAX_FAILURES_SHOWN
            ));
        }
    }
    append_dropped(&mut reply, &prepared.dropped);
    Ok(reply)
}

/// `owner/name` is taken verbatim; a bare name is routed through the
/// authenticated account (cached display name when present, otherwise one
/// identity call).
async fn resolve_repo(
    ctx: &AppContext,
    identity: &str,
    token: &str,
    repository: &str,
) -> Result<RepoRef, AppError> {
    let repository = repository.trim();
    if repository.is_empty() {
        return Err(AppError::Validation("repository name is required".into()));
    }

    if let Some((owner, name)) = repository.split_once('/') {
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(AppError::Validation(format!(
                "'{repository}' is not a valid repository reference"
            )));
        }
        return Ok(RepoRef::new(owner, name));
    }

    let owner = match ctx.store.get_record(identity).await? {
        Some(record) => match record.display_name {
            Some(name) => name,
            None => ctx.hosting.verify_identity(token).await?.username,
        },
        None => ctx.hosting.verify_identity(token).await?.username,
    };
    Ok(RepoRef::new(owner, repository))
}

fn scope_satisfied(granted: &[String], required: &str) -> bool {
    granted.iter().any(|g| g == required || g.contains(required))
}

fn append_dropped(reply: &mut String, dropped: &[(String, String)]) {
    if dropped.is_empty() {
        return;
    }
    reply.push_str("\nSkipped:");
    for (path, reason) in dropped.iter().take(MAX_DROPPED_SHOWN) {
        reply.push_str(&format!("\n• {path} — {reason}"));
    }
    if dropped.len() > MAX_DROPPED_SHOWN {
        reply.push_str(&format!("\n…and {} more", dropped.len() - MAX_DROPPED_SHOWN));
    }
}
