//! Attachment download and batched create-or-update publishing.

pub mod download;
pub mod publish;
pub mod retry;

pub use publish::{Progress, ProgressFn, UploadOutcome};
pub use retry::RetryPolicy;
