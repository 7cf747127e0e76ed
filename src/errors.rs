use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid path in archive: {0}")]
    InvalidPath(String),

    #[error("archive too large: {size} bytes uncompressed (limit {limit})")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("archive bomb suspected in entry '{path}' (ratio {ratio:.0}:1)")]
    ArchiveBomb { path: String, ratio: f64 },

    #[error("archive has too many entries: {count} (limit {limit})")]
    TooManyEntries { count: usize, limit: usize },

    #[error("remote file changed concurrently: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("download timed out")]
    DownloadTimeout,

    #[error("download exceeds size limit of {limit} bytes")]
    DownloadTooLarge { limit: u64 },

    #[error("could not acquire store lock")]
    LockTimeout,

    #[error("credential could not be decrypted")]
    Decryption,

    #[error("hosting service error: {0}")]
    Hosting(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps the taxonomy to actionable user-facing text. The result still
    /// goes through `sanitize::sanitize_message` before leaving the process.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Invalid request: {msg}"),
            AppError::InvalidPath(path) => {
                format!("The archive contains an unsafe path ('{path}') and was rejected.")
            }
            AppError::ArchiveTooLarge { size, limit } => format!(
                "The archive expands to {size} bytes, over the {limit}-byte limit. \
                 Split it into smaller uploads."
            ),
            AppError::ArchiveBomb { path, .. } => format!(
                "Entry '{path}' has a suspicious compression ratio. The archive was rejected."
            ),
            AppError::TooManyEntries { count, limit } => {
                format!("The archive holds {count} files, over the {limit}-file limit.")
            }
            AppError::Conflict(path) => format!(
                "'{path}' kept changing on the remote side while uploading. Try again."
            ),
            AppError::NotFound(what) => format!(
                "{what} was not found. Create the repository on the hosting service first, \
                 then retry."
            ),
            AppError::DownloadTimeout => {
                "Downloading the attachment timed out. Please resubmit.".to_string()
            }
            AppError::DownloadTooLarge { limit } => {
                format!("The attachment exceeds the {limit}-byte download limit.")
            }
            AppError::LockTimeout => {
                "The credential store is busy right now. Please retry the command.".to_string()
            }
            AppError::Decryption => {
                "Your stored credential could not be read. Please log in again.".to_string()
            }
            AppError::Hosting(msg) => format!("The hosting service reported an error: {msg}"),
            AppError::Http(_) | AppError::Io(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "internal failure surfaced to user");
                "Something went wrong on our side. Please try again.".to_string()
            }
        }
    }

    /// True for errors the publish pipeline may retry (remote version races).
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}
