//! Outbound email seam. The default implementation writes the message to the
//! log instead of sending it, which keeps local setups working without SMTP
//! and is also how the first-login link surfaces when no mail relay exists.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the first-login link to a newly provisioned user. Callers
    /// treat delivery as fire-and-forget; workflow state never depends on it.
    async fn send_first_login_email(&self, username: &str, email: &str, link: &str) -> Result<()>;
}

/// Logs emails instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_first_login_email(&self, username: &str, email: &str, link: &str) -> Result<()> {
        info!("{}", "=".repeat(72));
        info!("FIRST LOGIN EMAIL (not actually sent)");
        info!("To: {} <{}>", username, email);
        info!("Subject: Welcome! Set up your password");
        info!("Set up your password with this one-time link:");
        info!("  {}", link);
        info!("{}", "=".repeat(72));
        Ok(())
    }
}

