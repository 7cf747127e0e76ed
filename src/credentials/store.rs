//! File-backed credential store: one encrypted record per user identity.
//!
//! Mutations take an exclusive advisory lock (exclusive-create lock file with
//! stale-lock takeover) and replace the store atomically via tmp + rename, so
//! lock-free readers only ever observe a consistent pre- or post-swap file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::credentials::cipher;
use crate::credentials::salt::InstallationSalt;
use crate::errors::AppError;

const LOCK_RETRY_DELAY_MS: u64 = 50;

/// One persisted credential. The access token only ever appears here as the
/// cipher blob; a record is never written with a plaintext secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub encrypted_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

pub struct CredentialStore {
    path: PathBuf,
    lock_path: PathBuf,
    master_secret: String,
    salt: InstallationSalt,
    lock_stale_after: std::time::Duration,
    lock_acquire_timeout: std::time::Duration,
}

impl CredentialStore {
    pub fn new(
        data_dir: &Path,
        master_secret: String,
        salt: InstallationSalt,
        limits: &Limits,
    ) -> Self {
        let path = data_dir.join("credentials.json");
        let lock_path = data_dir.join("credentials.json.lock");
        Self {
            path,
            lock_path,
            master_secret,
            salt,
            lock_stale_after: limits.lock_stale_after,
            lock_acquire_timeout: limits.lock_acquire_timeout,
        }
    }

    /// Encrypts `token` and writes the record, replacing any prior record for
    /// `identity` wholesale (including the registration timestamp).
    pub async fn save(
        &self,
        identity: &str,
        token: &str,
        display_name: Option<String>,
    ) -> Result<(), AppError> {
        let blob = cipher::encrypt(token, &self.master_secret, self.salt.as_bytes())?;
        let record = CredentialRecord {
            encrypted_secret: blob,
            display_name,
            registered_at: Utc::now(),
        };

        let _guard = self.acquire_lock().await?;
        let mut map = self.read_map().await?;
        map.insert(identity.to_string(), record);
        self.write_map(&map).await?;
        tracing::info!(identity, "credential saved");
        Ok(())
    }

    /// Returns the plaintext token, or `None` when the identity has no record
    /// *or* its record no longer decrypts. The two cases are logged apart but
    /// deliberately not distinguished to the caller.
    pub async fn get_decrypted(&self, identity: &str) -> Result<Option<String>, AppError> {
        let map = self.read_map().await?;
        let Some(record) = map.get(identity) else {
            return Ok(None);
        };
        match cipher::decrypt(
            &record.encrypted_secret,
            &self.master_secret,
            self.salt.as_bytes(),
        ) {
            Ok(token) => Ok(Some(token)),
            Err(AppError::Decryption) => {
                tracing::warn!(identity, "stored credential failed to decrypt");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads record metadata (display name, registration time) without
    /// touching the encrypted token.
    pub async fn get_record(&self, identity: &str) -> Result<Option<CredentialRecord>, AppError> {
        Ok(self.read_map().await?.get(identity).cloned())
    }

    /// Deletes the record. Returns true when one existed.
    pub async fn remove(&self, identity: &str) -> Result<bool, AppError> {
        let _guard = self.acquire_lock().await?;
        let mut map = self.read_map().await?;
        let existed = map.remove(identity).is_some();
        if existed {
            self.write_map(&map).await?;
            tracing::info!(identity, "credential removed");
        }
        Ok(existed)
    }

    pub async fn exists(&self, identity: &str) -> Result<bool, AppError> {
        Ok(self.read_map().await?.contains_key(identity))
    }

    async fn read_map(&self) -> Result<BTreeMap<String, CredentialRecord>, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("credential store corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Full-map replace: serialize to a sibling tmp file, rename over the real
    /// file (atomic on the same filesystem), then drop group/world bits.
    async fn write_map(&self, map: &BTreeMap<String, CredentialRecord>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize store: {e}")))?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        restrict_permissions(&self.path).await?;
        Ok(())
    }

    /// Exclusive-create advisory lock with stale takeover. A lock file older
    /// than `lock_stale_after` is treated as abandoned by a crashed writer.
    async fn acquire_lock(&self) -> Result<LockGuard, AppError> {
        if let Some(parent) = self.lock_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let deadline = Instant::now() + self.lock_acquire_timeout;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
                .await
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.takeover_if_stale().await? {
                        continue;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                tracing::warn!(path = %self.lock_path.display(), "store lock acquisition timed out");
                return Err(AppError::LockTimeout);
            }
            tokio::time::sleep(std::time::Duration::from_millis(LOCK_RETRY_DELAY_MS)).await;
        }
    }

    async fn takeover_if_stale(&self) -> Result<bool, AppError> {
        let age = match tokio::fs::metadata(&self.lock_path).await {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default(),
            // Holder released between our create attempt and this stat.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        if age > self.lock_stale_after {
            tracing::warn!(
                age_ms = age.as_millis() as u64,
                "removing abandoned store lock"
            );
            match tokio::fs::remove_file(&self.lock_path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(false)
        }
    }
}

/// Releases the advisory lock on drop, also on error paths.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(error = %e, "failed to release store lock");
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &Path) -> CredentialStore {
        CredentialStore::new(
            dir,
            "a-master-secret-with-enough-characters!!".into(),
            InstallationSalt::for_tests(vec![3u8; 64]),
            &Limits::default(),
        )
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save("user-1", "ghp_tok", Some("octocat".into()))
            .await
            .unwrap();
        assert_eq!(
            store.get_decrypted("user-1").await.unwrap().as_deref(),
            Some("ghp_tok")
        );
        let record = store.get_record("user-1").await.unwrap().unwrap();
        assert_eq!(record.display_name.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn remove_then_get_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.save("user-1", "tok", None).await.unwrap();
        assert!(store.remove("user-1").await.unwrap());
        assert!(!store.remove("user-1").await.unwrap());
        assert_eq!(store.get_decrypted("user-1").await.unwrap(), None);
        assert!(!store.exists("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn plaintext_never_hits_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save("user-1", "ghp_supersecret", None).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("credentials.json")).unwrap();
        assert!(!raw.contains("ghp_supersecret"));
    }

    #[tokio::test]
    async fn resave_replaces_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.save("u", "tok-a", Some("old".into())).await.unwrap();
        let first = store.get_record("u").await.unwrap().unwrap();
        store.save("u", "tok-b", None).await.unwrap();
        let second = store.get_record("u").await.unwrap().unwrap();

        assert_eq!(store.get_decrypted("u").await.unwrap().as_deref(), Some("tok-b"));
        assert_eq!(second.display_name, None);
        assert!(second.registered_at >= first.registered_at);
    }

    #[tokio::test]
    async fn undecryptable_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save("u", "tok", None).await.unwrap();

        // Same file, different salt — as after a lost salt file.
        let other = CredentialStore::new(
            dir.path(),
            "a-master-secret-with-enough-characters!!".into(),
            InstallationSalt::for_tests(vec![4u8; 64]),
            &Limits::default(),
        );
        assert_eq!(other.get_decrypted("u").await.unwrap(), None);
        // The record itself still exists.
        assert!(other.exists("u").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_saves_do_not_corrupt_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(&format!("user-{i}"), &format!("tok-{i}"), None)
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        for i in 0..8 {
            assert_eq!(
                store
                    .get_decrypted(&format!("user-{i}"))
                    .await
                    .unwrap()
                    .as_deref(),
                Some(format!("tok-{i}").as_str())
            );
        }
        // The file parses as a single valid JSON map.
        let raw = std::fs::read(dir.path().join("credentials.json")).unwrap();
        let map: BTreeMap<String, CredentialRecord> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(map.len(), 8);
    }

    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut limits = Limits::default();
        limits.lock_stale_after = std::time::Duration::from_millis(50);
        limits.lock_acquire_timeout = std::time::Duration::from_secs(2);
        let store = CredentialStore::new(
            dir.path(),
            "a-master-secret-with-enough-characters!!".into(),
            InstallationSalt::for_tests(vec![3u8; 64]),
            &limits,
        );

        // Simulate a crashed writer.
        std::fs::write(dir.path().join("credentials.json.lock"), b"").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        store.save("u", "tok", None).await.unwrap();
        assert!(store.exists("u").await.unwrap());
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut limits = Limits::default();
        limits.lock_stale_after = std::time::Duration::from_secs(60);
        limits.lock_acquire_timeout = std::time::Duration::from_millis(200);
        let store = CredentialStore::new(
            dir.path(),
            "a-master-secret-with-enough-characters!!".into(),
            InstallationSalt::for_tests(vec![3u8; 64]),
            &limits,
        );

        std::fs::write(dir.path().join("credentials.json.lock"), b"").unwrap();
        assert!(matches!(
            store.save("u", "tok", None).await,
            Err(AppError::LockTimeout)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save("u", "tok", None).await.unwrap();
        let mode = std::fs::metadata(dir.path().join("credentials.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
