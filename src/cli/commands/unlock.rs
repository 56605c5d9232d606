//! Unlock account command handler

use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_unlock_user(config: &Config, username: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;

    state.auth.unlock_user(username, "cli").await?;

    println!("✓ Account '{}' unlocked", username);

    Ok(())
}
