//! Session guard for commands that require a signed-in operator

use anyhow::{bail, Context, Result};
use relayctl_store::StoreClient;
use tracing::debug;

use crate::config::ConfigManager;

/// Restore the persisted session into the client, refreshing it when the
/// access token has lapsed. Commands that talk to protected tables call this
/// before doing anything else.
pub async fn require_session(client: &StoreClient, config: &ConfigManager) -> Result<()> {
    let stored = config.load()?;

    let Some(session) = stored.session else {
        bail!("Not signed in. Run 'relayctl login' first");
    };

    client.auth().restore(session.clone());

    if session.is_expired() {
        debug!("stored session expired, refreshing");
        let refreshed = client
            .auth()
            .refresh()
            .await
            .context("Session expired and refresh failed. Run 'relayctl login' again")?;
        config.store_session(Some(refreshed))?;
    }

    Ok(())
}
