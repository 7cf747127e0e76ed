//! Installation salt: one random byte sequence per deployment.
//!
//! Generated on first use, persisted with owner-only permissions, and held in
//! the app context afterwards. Losing the file makes every stored credential
//! permanently undecryptable — there is deliberately no recovery path.

use std::path::Path;

use aes_gcm::aead::OsRng;
use rand::RngCore;

use crate::errors::AppError;

pub const SALT_LEN: usize = 64;

#[derive(Clone)]
pub struct InstallationSalt {
    bytes: Vec<u8>,
}

impl InstallationSalt {
    /// Loads the salt file, creating it with fresh random bytes when absent.
    pub async fn load_or_create(path: &Path) -> Result<Self, AppError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.len() == SALT_LEN => return Ok(Self { bytes }),
            Ok(bytes) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "salt file is {} bytes, expected {SALT_LEN}; refusing to guess",
                    bytes.len()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut bytes = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut bytes);
        tokio::fs::write(path, &bytes).await?;
        restrict_permissions(path).await?;
        tracing::info!(path = %path.display(), "generated new installation salt");
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[cfg(test)]
    pub fn for_tests(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
