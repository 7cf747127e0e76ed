use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the credential map file and the installation salt.
    pub data_dir: PathBuf,
    /// Long-term secret the token cipher derives its key from. Must be at
    /// least 32 characters; the environment validator enforces that before
    /// this process starts.
    pub master_secret: String,
    /// Scopes a token must grant before login is accepted.
    /// A granted scope satisfies a required one when it equals or contains it.
    pub required_scopes: Vec<String>,
    pub limits: Limits,
    pub rate: RateConfig,
}

/// Tunable safety thresholds. These are configuration, not hidden magic.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Total uncompressed archive size cap. Default 500 MiB.
    pub max_uncompressed_bytes: u64,
    /// Per-entry compression ratio cap. Default 100:1.
    pub max_compression_ratio: f64,
    /// Archive entry count cap. Default 10,000.
    pub max_entries: usize,
    /// Attachment download size cap, enforced as bytes arrive. Default 50 MB.
    pub max_download_bytes: u64,
    /// Attachment download wall-clock timeout. Default 60s.
    pub download_timeout: Duration,
    /// Concurrent publishes per batch. Default 5.
    pub batch_size: usize,
    /// Store lock considered abandoned past this age. Default 5s.
    pub lock_stale_after: Duration,
    /// Give up acquiring the store lock past this deadline. Default 10s.
    pub lock_acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Minimum interval between two commands from one identity. Default 2s.
    pub cooldown: Duration,
    /// Commands allowed per rolling window. Default 10.
    pub max_per_window: u32,
    /// Rolling window length. Default 60s.
    pub window: Duration,
    /// Interval of the eviction sweep over the rate table. Default 5m.
    pub sweep_interval: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_uncompressed_bytes: 500 * 1024 * 1024,
            max_compression_ratio: 100.0,
            max_entries: 10_000,
            max_download_bytes: 50 * 1000 * 1000,
            download_timeout: Duration::from_secs(60),
            batch_size: 5,
            lock_stale_after: Duration::from_secs(5),
            lock_acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2),
            max_per_window: 10,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let master_secret = std::env::var("REPODROP_MASTER_SECRET").unwrap_or_default();
    if master_secret.len() < 32 {
        anyhow::bail!(
            "REPODROP_MASTER_SECRET must be set to at least 32 characters \
             (got {} chars)",
            master_secret.len()
        );
    }

    let data_dir = std::env::var("REPODROP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"));

    let required_scopes = std::env::var("REPODROP_REQUIRED_SCOPES")
        .unwrap_or_else(|_| "repo".into())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let mut limits = Limits::default();
    if let Some(v) = env_u64("REPODROP_MAX_UNCOMPRESSED_BYTES") {
        limits.max_uncompressed_bytes = v;
    }
    if let Some(v) = env_f64("REPODROP_MAX_COMPRESSION_RATIO") {
        limits.max_compression_ratio = v;
    }
    if let Some(v) = env_u64("REPODROP_MAX_ENTRIES") {
        limits.max_entries = v as usize;
    }
    if let Some(v) = env_u64("REPODROP_MAX_DOWNLOAD_BYTES") {
        limits.max_download_bytes = v;
    }
    if let Some(v) = env_u64("REPODROP_DOWNLOAD_TIMEOUT_SECS") {
        limits.download_timeout = Duration::from_secs(v);
    }
    if let Some(v) = env_u64("REPODROP_BATCH_SIZE") {
        limits.batch_size = (v as usize).max(1);
    }
    if let Some(v) = env_u64("REPODROP_LOCK_STALE_AFTER_SECS") {
        limits.lock_stale_after = Duration::from_secs(v);
    }
    if let Some(v) = env_u64("REPODROP_LOCK_ACQUIRE_TIMEOUT_SECS") {
        limits.lock_acquire_timeout = Duration::from_secs(v);
    }

    let mut rate = RateConfig::default();
    if let Some(v) = env_u64("REPODROP_RATE_COOLDOWN_SECS") {
        rate.cooldown = Duration::from_secs(v);
    }
    if let Some(v) = env_u64("REPODROP_RATE_MAX_PER_WINDOW") {
        rate.max_per_window = v as u32;
    }
    if let Some(v) = env_u64("REPODROP_RATE_WINDOW_SECS") {
        rate.window = Duration::from_secs(v);
    }
    if let Some(v) = env_u64("REPODROP_RATE_SWEEP_SECS") {
        rate.sweep_interval = Duration::from_secs(v);
    }

    Ok(Config {
        data_dir,
        master_secret,
        required_scopes,
        limits,
        rate,
    })
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test for all env overrides: the variables are process-global, so
    // splitting this up would race under the parallel test runner.
    #[test]
    fn load_applies_env_overrides() {
        let vars = [
            ("REPODROP_MASTER_SECRET", "a-master-secret-with-enough-characters!!"),
            ("REPODROP_MAX_COMPRESSION_RATIO", "42.5"),
            ("REPODROP_DOWNLOAD_TIMEOUT_SECS", "7"),
            ("REPODROP_BATCH_SIZE", "0"),
            ("REPODROP_RATE_COOLDOWN_SECS", "5"),
            ("REPODROP_RATE_MAX_PER_WINDOW", "3"),
            ("REPODROP_RATE_WINDOW_SECS", "30"),
            ("REPODROP_REQUIRED_SCOPES", "repo, workflow"),
        ];
        for (k, v) in vars {
            std::env::set_var(k, v);
        }

        let config = load().unwrap();
        for (k, _) in vars {
            std::env::remove_var(k);
        }

        assert_eq!(config.limits.max_compression_ratio, 42.5);
        assert_eq!(config.limits.download_timeout, Duration::from_secs(7));
        // A zero batch size is clamped to one.
        assert_eq!(config.limits.batch_size, 1);
        assert_eq!(config.rate.cooldown, Duration::from_secs(5));
        assert_eq!(config.rate.max_per_window, 3);
        assert_eq!(config.rate.window, Duration::from_secs(30));
        assert_eq!(config.required_scopes, vec!["repo", "workflow"]);
        // Untouched tunables keep their defaults.
        assert_eq!(config.limits.max_entries, 10_000);
    }

    #[test]
    fn short_master_secret_refused() {
        // Does not set REPODROP_MASTER_SECRET; an empty or inherited short
        // value must fail the length check.
        match load() {
            Err(e) => assert!(e.to_string().contains("REPODROP_MASTER_SECRET")),
            Ok(config) => assert!(config.master_secret.len() >= 32),
        }
    }
}
