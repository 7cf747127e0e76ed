//! Explicit per-deployment context: loaded salt, credential store, rate
//! table, and the hosting-client handle. Passed into every operation instead
//! of living in process-wide state, which keeps tests on fakes trivial.

use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{CredentialStore, InstallationSalt};
use crate::errors::AppError;
use crate::hosting::github::GithubClient;
use crate::hosting::HostingClient;
use crate::ratelimit::RateGovernor;

pub struct AppContext {
    pub config: Config,
    pub store: CredentialStore,
    pub governor: RateGovernor,
    pub hosting: Arc<dyn HostingClient>,
    pub http: reqwest::Client,
}

impl AppContext {
    /// Builds the context against the real hosting service.
    pub async fn init(config: Config) -> Result<Self, AppError> {
        let hosting: Arc<dyn HostingClient> = Arc::new(GithubClient::new()?);
        Self::with_hosting(config, hosting).await
    }

    /// Builds the context with an injected hosting client (tests, mock
    /// servers).
    pub async fn with_hosting(
        config: Config,
        hosting: Arc<dyn HostingClient>,
    ) -> Result<Self, AppError> {
        let salt =
            InstallationSalt::load_or_create(&config.data_dir.join("installation.salt")).await?;
        let store = CredentialStore::new(
            &config.data_dir,
            config.master_secret.clone(),
            salt,
            &config.limits,
        );
        let governor = RateGovernor::new(config.rate.clone());
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(AppError::Http)?;

        Ok(Self {
            config,
            store,
            governor,
            hosting,
            http,
        })
    }
}
