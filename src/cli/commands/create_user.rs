//! Create user command handler

use crate::config::Config;
use crate::services::RegisterUser;
use crate::state::SharedState;

pub async fn cmd_create_user(
    config: &Config,
    username: &str,
    email: &str,
    role: &str,
) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;

    let created = state
        .auth
        .register_user(
            RegisterUser {
                username: username.to_string(),
                email: email.to_string(),
                roles: vec![role.to_string()],
            },
            "cli",
        )
        .await?;

    println!("User created");
    println!("  Username: {}", created.username);
    println!("  Email:    {}", created.email);
    println!("  Roles:    {}", created.roles.join(", "));
    println!();
    println!("First-login link (also sent by email):");
    println!("  {}", created.first_login_link);

    Ok(())
}
