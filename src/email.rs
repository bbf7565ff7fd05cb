use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Message},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use thiserror::Error;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("mail task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outbound mail seam. A fake implementation backs unit tests.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(
        &self,
        to: &str,
        username: &str,
        confirm_url: &str,
    ) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_confirmation(
        &self,
        to: &str,
        username: &str,
        confirm_url: &str,
    ) -> Result<(), MailError> {
        let body = format!(
            r#"Hi {},

Thanks for registering. Confirm your email address by opening the link below:

{}

If you did not create an account, you can safely ignore this email."#,
            username, confirm_url
        );

        let email = Message::builder()
            .from(self.config.from.parse()?)
            .to(to.parse()?)
            .subject("Confirm your email")
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        let cfg = self.config.clone();
        // lettre's SmtpTransport is blocking; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || -> Result<(), MailError> {
            let builder = SmtpTransport::relay(&cfg.smtp_host)?.port(cfg.smtp_port);
            let mailer = match (cfg.smtp_username, cfg.smtp_password) {
                (Some(user), Some(pass)) => {
                    builder.credentials(Credentials::new(user, pass)).build()
                }
                _ => builder.build(),
            };
            mailer.send(&email)?;
            Ok(())
        })
        .await??;

        info!(to = %to, "confirmation email sent");
        Ok(())
    }
}
