//! Account info command handler

use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_user_info(config: &Config, username: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;

    let info = state.auth.user_info(username).await?;

    println!("{}", info.username);
    println!("{:-<50}", "");
    println!("  Email:                {}", info.email);
    println!("  Roles:                {}", info.roles.join(", "));
    println!("  Enabled:              {}", info.enabled);
    println!("  Locked:               {}", info.locked);
    println!("  Failed attempts:      {}", info.failed_attempts);
    println!(
        "  Locked until:         {}",
        info.locked_until.as_deref().unwrap_or("-")
    );
    println!("  Must change password: {}", info.must_change_password);
    println!("  Temporary password:   {}", info.temporary_password);
    println!("  Created:              {}", info.created_at);
    println!("  Updated:              {}", info.updated_at);

    Ok(())
}
