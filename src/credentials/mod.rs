//! Encrypted per-user credential storage.

pub mod cipher;
pub mod salt;
pub mod store;

pub use salt::InstallationSalt;
pub use store::{CredentialRecord, CredentialStore};
