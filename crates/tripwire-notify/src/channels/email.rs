use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use tripwire_common::types::{AlertInstance, NotificationChannel};

use crate::channels::parse_config;
use crate::error::{NotifyError, Result};
use crate::utils::{backoff, MAX_ATTEMPTS};
use crate::{NotificationMessage, NotificationProvider, ProviderKind, SendOutcome};

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from: String,
    to: Vec<String>,
}

impl EmailConfig {
    fn parse(config: &Value) -> Result<Self> {
        let cfg: EmailConfig = parse_config("email", config)?;
        if cfg.smtp_host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("email: smtp_host is empty".into()));
        }
        match (&cfg.smtp_username, &cfg.smtp_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(NotifyError::InvalidConfig(
                    "email: smtp_username and smtp_password must be set together".into(),
                ));
            }
            _ => {}
        }
        if cfg.to.is_empty() {
            return Err(NotifyError::InvalidConfig("email: no recipients in 'to'".into()));
        }
        parse_mailbox(&cfg.from)?;
        for addr in &cfg.to {
            parse_mailbox(addr)?;
        }
        Ok(cfg)
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidConfig(format!("email: invalid address '{addr}': {e}")))
}

/// SMTP delivery through `lettre`; one message per send, every configured
/// recipient on the `To` line.
pub struct EmailProvider;

impl EmailProvider {
    pub fn new() -> Self {
        Self
    }

    fn build_message(
        cfg: &EmailConfig,
        alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> Result<(Message, String)> {
        let message_id = format!(
            "<{}.{}@tripwire>",
            alert.id,
            Utc::now().timestamp_millis()
        );
        let mut builder = Message::builder()
            .from(parse_mailbox(&cfg.from)?)
            .subject(format!("[tripwire] {}", message.title))
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN);
        for addr in &cfg.to {
            builder = builder.to(parse_mailbox(addr)?);
        }
        let mut body = message.body.clone();
        if let Some(ref url) = message.action_url {
            body.push_str(&format!("\n\nView alert: {url}"));
        }
        let email = builder
            .body(body)
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?;
        Ok((email, message_id))
    }

    fn transport(cfg: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?
            .port(cfg.smtp_port);
        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }
}

impl Default for EmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationProvider for EmailProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Email
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        EmailConfig::parse(config).map(|_| ())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        let prepared = EmailConfig::parse(&channel.config).and_then(|cfg| {
            let transport = Self::transport(&cfg)?;
            let (email, message_id) = Self::build_message(&cfg, alert, message)?;
            Ok((transport, email, message_id))
        });
        let (transport, email, message_id) = match prepared {
            Ok(p) => p,
            Err(e) => return SendOutcome::failed(e.to_string(), 0),
        };

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match transport.send(email.clone()).await {
                Ok(resp) => {
                    let response = format!(
                        "{} {}",
                        resp.code(),
                        resp.message().collect::<Vec<_>>().join(" ")
                    );
                    return SendOutcome {
                        success: true,
                        message_id: Some(message_id),
                        response: Some(response),
                        error: None,
                        attempts: attempt + 1,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        channel_id = %channel.id,
                        attempt = attempt + 1,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    last_err = Some(e.to_string());
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff(attempt)).await;
                    }
                }
            }
        }

        let error = last_err.unwrap_or_else(|| "email send failed".to_string());
        tracing::error!(
            channel_id = %channel.id,
            error = %error,
            "Email send failed after {MAX_ATTEMPTS} attempts"
        );
        SendOutcome::failed(error, MAX_ATTEMPTS)
    }
}
