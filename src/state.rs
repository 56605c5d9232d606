use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, LogMailer, Mailer, SeaOrmAuthService};

/// Long-lived application state shared by the HTTP server and the CLI.
#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer = Arc::new(LogMailer);
        Self::with_mailer(config, mailer).await
    }

    /// Builds the state with a specific mailer, used by tests to capture
    /// outgoing first-login emails.
    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let service = SeaOrmAuthService::new(store.clone(), &config, mailer);

        // Seeded or imported accounts that still need their first-login
        // email get one on startup, at most once per account.
        service.ensure_bootstrap_links().await?;

        let auth: Arc<dyn AuthService> = Arc::new(service);

        Ok(Self {
            config,
            store,
            auth,
        })
    }
}
