use std::str::FromStr;
use std::time::Duration;

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::DeliveryPort;
use crate::errors::DeliveryError;
use crate::render;
use crate::report::Report;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// TLS from the first byte (port 465)
    Tls,
    /// Unencrypted, for local relays only
    None,
}

impl FromStr for SmtpTls {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" | "smtps" => Ok(SmtpTls::Tls),
            "none" | "plain" => Ok(SmtpTls::None),
            other => Err(DeliveryError::Config(format!("unknown smtp_tls mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    /// Empty for relays that accept unauthenticated mail
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Sends the report as a multipart email: HTML with a markdown plain-text alternative.
pub struct EmailDelivery {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    subject_prefix: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

fn mailbox(address: &str, what: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|e| DeliveryError::Config(format!("{} address '{}' is invalid: {}", what, address, e)))
}

impl EmailDelivery {
    pub fn new(
        smtp: SmtpSettings,
        from: &str,
        recipients: &[String],
        subject_prefix: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        if recipients.is_empty() {
            return Err(DeliveryError::Config("no email recipients configured".to_string()));
        }
        if !smtp.username.is_empty() && smtp.password.is_empty() {
            return Err(DeliveryError::Config("SMTP password missing for the configured user".to_string()));
        }

        let from = mailbox(from, "sender")?;
        let recipients = recipients
            .iter()
            .map(|r| mailbox(r, "recipient"))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = match smtp.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host),
        };
        let mut builder = builder.port(smtp.port).timeout(Some(smtp.timeout));
        if !smtp.username.is_empty() {
            builder = builder.credentials(Credentials::new(smtp.username, smtp.password));
        }

        Ok(Self {
            from,
            recipients,
            subject_prefix: subject_prefix.into(),
            transport: builder.build(),
        })
    }

    pub(crate) fn subject(&self, report: &Report) -> String {
        let subject = format!("{} - {}", report.title, report.period_end.format("%Y-%m-%d"));
        match self.subject_prefix.trim() {
            "" => subject,
            prefix => format!("{} {}", prefix, subject),
        }
    }

    pub(crate) fn message(&self, report: &Report) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject(report));
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        Ok(builder.multipart(MultiPart::alternative_plain_html(
            render::markdown(report),
            render::html(report),
        ))?)
    }
}

#[async_trait::async_trait]
impl DeliveryPort for EmailDelivery {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let message = self.message(report)?;
        self.transport.send(message).await?;
        info!(recipients = self.recipients.len(), "email: report sent");
        Ok(())
    }
}
