use std::sync::Arc;

use crosstalk_accounts::MemoryAccountStore;
use crosstalk_config::AppConfig;
use crosstalk_gateway::RelayState;
use crosstalk_relay::{HistoryBuffer, InviteLedger};
use tracing::{debug, info};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a running relay needs, wired together from the configuration.
#[derive(Clone)]
pub struct RelayServices {
    pub state: RelayState,
}

impl RelayServices {
    pub fn initialise(config: &AppConfig) -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        let invites = InviteLedger::new();
        let history = HistoryBuffer::new(config.relay.history_capacity);
        let state = RelayState::new(accounts, invites, history);

        info!(
            history_capacity = config.relay.history_capacity,
            "relay state initialised"
        );
        if config.mail.is_configured() {
            info!("mail notifications configured");
        } else {
            debug!("mail notifications disabled, no SMTP credentials");
        }

        Self { state }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
