use async_trait::async_trait;
use tracing::info;

use crate::users::repo_types::User;

/// Delivers verification links to users.
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(&self, user: &User, link: &str) -> anyhow::Result<()>;
}

/// Writes the link to the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl VerificationMailer for LogMailer {
    async fn send_verification(&self, user: &User, link: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, %link, "verification email");
        Ok(())
    }
}
