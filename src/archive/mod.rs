//! Archive ingestion: bounds inspection, path sanitation, entry extraction.

pub mod inspector;
pub mod paths;

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::config::Limits;
use crate::errors::AppError;

/// One archive file ready to publish. Exists only for the duration of a
/// single upload; never persisted.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub raw_path: String,
    pub path: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct PreparedArchive {
    pub entries: Vec<ArchiveEntry>,
    /// Entries excluded before publishing, with a human-readable reason.
    pub dropped: Vec<(String, String)>,
}

/// Validates the archive, sanitizes entry paths, strips a shared wrapper
/// directory, and only then reads entry contents into memory.
///
/// Bounds violations and unsafe paths abort the whole archive; per-entry
/// exclusions (symlinks, entries emptied by prefix stripping) are recorded in
/// `dropped` instead.
pub fn prepare(bytes: &[u8], limits: &Limits) -> Result<PreparedArchive, AppError> {
    let metas = inspector::inspect(bytes, limits)?;

    let mut dropped = Vec::new();
    let mut kept: Vec<(String, String)> = Vec::new(); // (raw, normalized)
    for meta in metas {
        if meta.is_symlink {
            dropped.push((meta.raw_path, "symlink entries are not published".into()));
            continue;
        }
        let normalized = paths::normalize(&meta.raw_path)?;
        if normalized.is_empty() {
            dropped.push((meta.raw_path, "path is empty after normalization".into()));
            continue;
        }
        kept.push((meta.raw_path, normalized));
    }

    let normalized: Vec<String> = kept.iter().map(|(_, n)| n.clone()).collect();
    let prefix = paths::common_prefix_segments(&normalized);
    if prefix > 0 {
        tracing::debug!(segments = prefix, "stripping shared wrapper directory");
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Validation(format!("not a readable ZIP archive: {e}")))?;

    let mut entries = Vec::new();
    for (raw, norm) in kept {
        let stripped = paths::strip_segments(&norm, prefix);
        if stripped.is_empty() {
            dropped.push((raw, "path is empty after removing the wrapper directory".into()));
            continue;
        }

        let mut file = archive
            .by_name(&raw)
            .map_err(|e| AppError::Validation(format!("unreadable archive entry '{raw}': {e}")))?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;

        entries.push(ArchiveEntry {
            raw_path: raw,
            path: stripped,
            data,
        });
    }

    Ok(PreparedArchive { entries, dropped })
}
