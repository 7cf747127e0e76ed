//! Create-or-update publishing of validated archive entries.
//!
//! Entries go out in fixed-size batches: within a batch every publish runs
//! concurrently, batch N+1 starts only after batch N has fully settled. That
//! bounds peak in-flight requests to the batch size. One entry failing never
//! aborts its batch or the overall operation.

use std::time::{Duration, Instant};

use futures::future::join_all;

use super::retry::RetryPolicy;
use crate::archive::{paths, ArchiveEntry};
use crate::config::Limits;
use crate::errors::AppError;
use crate::hosting::{HostingClient, RepoRef};

const PROGRESS_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Throttled progress sink. Invoked at most once per second, plus one
/// guaranteed call after all entries settle.
pub type ProgressFn = dyn Fn(Progress) + Send + Sync;

#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<(String, String)>,
}

pub async fn publish(
    client: &dyn HostingClient,
    token: &str,
    repo: &RepoRef,
    folder: Option<&str>,
    entries: &[ArchiveEntry],
    author: &str,
    limits: &Limits,
    progress: Option<&ProgressFn>,
) -> Result<UploadOutcome, AppError> {
    let mut outcome = UploadOutcome {
        total: entries.len(),
        ..Default::default()
    };

    if entries.is_empty() {
        emit(progress, 0, 0);
        return Ok(outcome);
    }

    // Content writes into a repository with zero history are rejected by the
    // hosting API, so seed a placeholder commit first.
    if !client.repo_has_content(token, repo).await? {
        client.bootstrap_empty_repo(token, repo).await?;
    }

    let policy = RetryPolicy::publish_default();
    let mut completed = 0usize;
    let mut last_emit: Option<Instant> = None;

    for batch in entries.chunks(limits.batch_size.max(1)) {
        let results = join_all(batch.iter().map(|entry| {
            let policy = policy.clone();
            async move {
                publish_entry(client, token, repo, folder, entry, author, &policy).await
            }
        }))
        .await;

        for (entry, result) in batch.iter().zip(results) {
            completed += 1;
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "entry publish failed");
                    outcome.failures.push((entry.path.clone(), e.user_message()));
                }
            }
        }

        let due = last_emit.map_or(true, |t| t.elapsed() >= PROGRESS_MIN_INTERVAL);
        if due && completed < entries.len() {
            emit(progress, completed, entries.len());
            last_emit = Some(Instant::now());
        }
    }

    emit(progress, completed, entries.len());
    tracing::info!(
        repo = %repo,
        total = outcome.total,
        succeeded = outcome.succeeded,
        failed = outcome.failures.len(),
        "publish finished"
    );
    Ok(outcome)
}

async fn publish_entry(
    client: &dyn HostingClient,
    token: &str,
    repo: &RepoRef,
    folder: Option<&str>,
    entry: &ArchiveEntry,
    author: &str,
    policy: &RetryPolicy,
) -> Result<(), AppError> {
    let joined = match folder {
        Some(f) if !f.is_empty() => format!("{f}/{}", entry.path),
        _ => entry.path.clone(),
    };
    let remote_path = paths::normalize(&joined)?;

    policy
        .run(
            |_attempt| {
                let remote_path = remote_path.clone();
                async move {
                    // Re-read the version marker on every attempt: a conflict
                    // means it moved underneath us.
                    let sha = client.get_file_sha(token, repo, &remote_path).await?;
                    let action = if sha.is_some() { "Update" } else { "Add" };
                    let message = format!("{action} {remote_path} (uploaded by {author})");
                    client
                        .put_file(token, repo, &remote_path, &entry.data, &message, sha.as_deref())
                        .await
                }
            },
            AppError::is_conflict,
        )
        .await
}

fn emit(progress: Option<&ProgressFn>, completed: usize, total: usize) {
    if let Some(f) = progress {
        f(Progress { completed, total });
    }
}
