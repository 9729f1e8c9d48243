//! Mail transports: SMTP for real runs, stdout for dry runs.

use std::fmt;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::MailConfig;
use crate::services::{MailTransport, OutgoingMessage};

/// Mail account identity and secret, read from the environment.
#[derive(Clone)]
pub struct MailCredentials {
    pub user: String,
    secret: String,
}

impl MailCredentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Read the variables named by `user_env` and `pass_env`.
    pub fn from_env(config: &MailConfig) -> Result<Self> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    fn from_lookup(config: &MailConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::config(format!("environment variable {name} is not set")))
        };
        Ok(Self::new(read(&config.user_env)?, read(&config.pass_env)?))
    }
}

impl fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailCredentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Prints messages instead of sending them.
#[derive(Debug, Default)]
pub struct StdoutTransport;

#[async_trait]
impl MailTransport for StdoutTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        println!("Subject: {}\n\n{}", message.subject, message.body);
        Ok(())
    }
}

#[cfg(feature = "smtp")]
pub use smtp::SmtpMailer;

#[cfg(feature = "smtp")]
mod smtp {
    use std::time::Duration;

    use async_trait::async_trait;
    use lettre::message::Mailbox;
    use lettre::message::header::ContentType;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    use super::MailCredentials;
    use crate::error::{AppError, Result};
    use crate::models::{MailConfig, MailTls};
    use crate::services::{MailTransport, OutgoingMessage};

    /// SMTP delivery over TLS.
    pub struct SmtpMailer {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        to: Vec<Mailbox>,
    }

    impl SmtpMailer {
        pub fn new(config: &MailConfig, credentials: MailCredentials) -> Result<Self> {
            let builder = match config.tls {
                MailTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host),
                MailTls::Starttls => {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                }
            }
            .map_err(|e| AppError::config(format!("SMTP relay {}: {e}", config.smtp_host)))?;

            let sender = config.from.as_deref().unwrap_or(&credentials.user);
            let from = parse_mailbox(sender)?;
            let to = config
                .to
                .iter()
                .map(|addr| parse_mailbox(addr))
                .collect::<Result<Vec<_>>>()?;

            let transport = builder
                .port(config.smtp_port)
                .credentials(Credentials::new(credentials.user, credentials.secret))
                .timeout(Some(Duration::from_millis(config.timeout_ms)))
                .build();

            log::debug!(
                "SMTP transport ready: {}:{} ({:?})",
                config.smtp_host,
                config.smtp_port,
                config.tls
            );
            Ok(Self {
                transport,
                from,
                to,
            })
        }
    }

    fn parse_mailbox(address: &str) -> Result<Mailbox> {
        address
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("invalid mail address '{address}': {e}")))
    }

    #[async_trait]
    impl MailTransport for SmtpMailer {
        async fn send(&self, message: &OutgoingMessage) -> Result<()> {
            let mut builder = Message::builder()
                .from(self.from.clone())
                .subject(message.subject.clone())
                .header(ContentType::TEXT_PLAIN);
            for recipient in &self.to {
                builder = builder.to(recipient.clone());
            }
            let email = builder
                .body(message.body.clone())
                .map_err(|e| AppError::mail(e, false))?;

            self.transport
                .send(email)
                .await
                .map_err(|e| AppError::mail(&e, !e.is_permanent()))?;
            Ok(())
        }
    }
}
