//! `Bot`: ties negotiation, the live client and the session loop together.
//!
//! This is what the binary drives. Each subcommand maps to one method:
//!
//! ```text
//!   ping       → Bot::ping
//!   negotiate  → Bot::negotiate / Bot::clean
//!   run        → Bot::run = negotiate(force = false) → play
//! ```

use std::future::Future;
use std::sync::Arc;

use quarry_negotiate::{
    ActiveVersion, FileStore, NegotiationController, NegotiationOutcome, OutcomeSource,
};
use quarry_protocol::ServerStatus;

use crate::client::{GameClient, TcpConnector, TcpPinger, fetch_status};
use crate::session::{SessionController, SessionEnd};
use crate::{BotConfig, QuarryError};

/// Negotiation controller over the live TCP primitives and on-disk state.
pub type LiveController = NegotiationController<TcpPinger, TcpConnector, FileStore>;

/// One-line machine-readable summary of a status response.
///
/// `PROTOCOL=767 VERSION_NAME="1.21.1" MODDED=unknown`
pub fn status_line(status: &ServerStatus) -> String {
    format!(
        "PROTOCOL={} VERSION_NAME=\"{}\" MODDED={}",
        status.version.protocol,
        status.version.name,
        status.mod_loader()
    )
}

/// A configured bot. Holds the process-wide active protocol version.
pub struct Bot {
    config: BotConfig,
    active: ActiveVersion,
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config: config.validated(),
            active: ActiveVersion::default(),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// The protocol number the next connection will speak.
    pub fn active_version(&self) -> &ActiveVersion {
        &self.active
    }

    /// Fetches the server's status document.
    pub async fn ping(&self) -> Result<ServerStatus, QuarryError> {
        fetch_status(
            &self.config.endpoint,
            self.active.get(),
            self.config.negotiation.connect_timeout,
        )
        .await
    }

    fn controller(&self) -> Result<LiveController, QuarryError> {
        let negotiation = &self.config.negotiation;
        let store = FileStore::new(&negotiation.state_dir)?;
        Ok(NegotiationController::new(
            TcpPinger::new(negotiation.connect_timeout),
            TcpConnector::new(self.config.username.clone(), negotiation.connect_timeout),
            store,
            self.config.endpoint.clone(),
            self.active.clone(),
            negotiation.clone(),
        ))
    }

    /// Finds a protocol version the server accepts and makes it active.
    pub async fn negotiate(&self, force: bool) -> Result<NegotiationOutcome, QuarryError> {
        let outcome = self.controller()?.run(force).await?;
        match outcome.source {
            OutcomeSource::Persisted => {
                tracing::info!(version = outcome.version, "using saved protocol version");
            }
            OutcomeSource::Discovered => tracing::info!(
                version = outcome.version,
                trials = outcome.trials,
                "protocol version negotiated"
            ),
        }
        Ok(outcome)
    }

    /// Removes the saved version and the attempt ledger.
    pub fn clean(&self) -> Result<(), QuarryError> {
        self.controller()?.clean()?;
        Ok(())
    }

    /// Joins at the active version and plays until the session ends.
    pub async fn play(
        &self,
        interrupt: impl Future<Output = ()>,
    ) -> Result<SessionEnd, QuarryError> {
        let version = self.active.get();
        tracing::info!(
            server = %self.config.endpoint,
            username = %self.config.username,
            version,
            "connecting"
        );

        let (client, events) = GameClient::join(
            &self.config.endpoint,
            version,
            &self.config.username,
            self.config.negotiation.connect_timeout,
        )
        .await?;
        let client = Arc::new(client);

        let controller = SessionController::new(Arc::clone(&client), events, self.config.clone());
        let end = controller.run(interrupt).await;

        client.close().await;
        Ok(end)
    }

    /// Negotiates (using a saved version when there is one), then plays.
    pub async fn run(
        &self,
        interrupt: impl Future<Output = ()>,
    ) -> Result<SessionEnd, QuarryError> {
        self.negotiate(false).await?;
        self.play(interrupt).await
    }
}
