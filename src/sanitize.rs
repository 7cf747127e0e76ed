//! Scrubs credential-shaped substrings and filesystem paths from any text
//! headed for a user-visible surface.
//!
//! Pure pattern-substitution passes, applied in sequence. Never panics; a
//! message that fails every pattern comes back unchanged (modulo truncation).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATION_MARKER: &str = "… [truncated]";

/// Personal access token shapes of the hosting service.
static HOSTING_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:ghp|gho|ghu|ghs|ghr)_[A-Za-z0-9]{36,}|\bgithub_pat_[A-Za-z0-9_]{36,}")
        .unwrap()
});

/// Three dot-separated base64url-ish segments — the shape of a chat-platform
/// bot token.
static BOT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9_-]{20,}\.[A-Za-z0-9_-]{6,}\.[A-Za-z0-9_-]{20,}\b").unwrap()
});

/// `secret=`, `key=`, `password=` assignments: the key name survives, the
/// value does not.
static KEY_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(secret|key|password)\s*=\s*\S+").unwrap());

/// Absolute paths under common home-directory prefixes.
static HOME_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/home/|/Users/|/root/|C:\\Users\\)[^\s'\x22]*").unwrap()
});

/// Redacts and truncates one message.
pub fn sanitize_message(message: &str) -> String {
    if message.trim().is_empty() {
        return "Unknown error".to_string();
    }

    let pass1 = HOSTING_TOKEN_RE.replace_all(message, "[redacted]");
    let pass2 = BOT_TOKEN_RE.replace_all(&pass1, "[redacted]");
    let pass3 = KEY_VALUE_RE.replace_all(&pass2, "$1=[redacted]");
    let pass4 = HOME_PATH_RE.replace_all(&pass3, "[path]");

    truncate(&pass4)
}

/// User-facing rendering of an error: taxonomy message, then redaction.
pub fn sanitize_error(error: &AppError) -> String {
    sanitize_message(&error.user_message())
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut out: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
