//! Archive entry path sanitation.
//!
//! Every rejection rule runs against the raw string and its percent-decoded
//! forms (two rounds, catching double-encoded traversal) before any
//! normalization happens. Rejection takes precedence over cleanup: a path with
//! a backslash is refused outright, never converted.

use std::borrow::Cow;

use crate::errors::AppError;

/// Validates and normalizes one archive entry path into a clean relative
/// path: forward slashes only, no leading slash, no `.`/empty segments.
pub fn normalize(raw: &str) -> Result<String, AppError> {
    reject_unsafe(raw)?;
    let decoded = percent_decode(raw)?;
    reject_unsafe(&decoded)?;
    let decoded_twice = percent_decode(&decoded)?;
    reject_unsafe(&decoded_twice)?;

    let cleaned: Vec<&str> = raw
        .trim_start_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect();
    Ok(cleaned.join("/"))
}

fn reject_unsafe(path: &str) -> Result<(), AppError> {
    if path.chars().any(|c| c.is_ascii_control()) {
        return Err(AppError::InvalidPath("contains control bytes".into()));
    }
    if path.contains('\\') {
        return Err(AppError::InvalidPath(path.into()));
    }
    if path.starts_with('/') {
        return Err(AppError::InvalidPath(path.into()));
    }
    // Drive-letter prefix ("C:...").
    let mut chars = path.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return Err(AppError::InvalidPath(path.into()));
        }
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(AppError::InvalidPath(path.into()));
    }
    Ok(())
}

fn percent_decode(path: &str) -> Result<String, AppError> {
    match urlencoding::decode(path) {
        Ok(Cow::Borrowed(s)) => Ok(s.to_string()),
        Ok(Cow::Owned(s)) => Ok(s),
        // Decoding to invalid UTF-8 is itself suspicious input.
        Err(_) => Err(AppError::InvalidPath(path.into())),
    }
}

/// Number of leading path segments shared by every path in `paths`, counting
/// only segments that are directories for all of them (the last segment of a
/// path is its filename and never part of the prefix).
///
/// Lexicographic first/last comparison over the sorted set is enough: any
/// shared leading sequence of the two extremes is shared by everything
/// between them.
pub fn common_prefix_segments(paths: &[String]) -> usize {
    if paths.is_empty() {
        return 0;
    }
    let mut sorted: Vec<&String> = paths.iter().collect();
    sorted.sort();
    let first: Vec<&str> = sorted[0].split('/').collect();
    let last: Vec<&str> = sorted[sorted.len() - 1].split('/').collect();

    // Keep at least the filename of both extremes out of the prefix.
    let max = first.len().saturating_sub(1).min(last.len().saturating_sub(1));
    let mut shared = 0;
    while shared < max && first[shared] == last[shared] {
        shared += 1;
    }
    shared
}

/// Drops the first `n` segments. Returns an empty string when nothing is left.
pub fn strip_segments(path: &str, n: usize) -> String {
    if n == 0 {
        return path.to_string();
    }
    path.split('/').skip(n).collect::<Vec<_>>().join("/")
}
