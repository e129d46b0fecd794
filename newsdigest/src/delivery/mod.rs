use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::errors::DeliveryError;
use crate::report::Report;

pub mod email;
pub mod file;
pub mod webhook;

pub use email::{EmailDelivery, SmtpSettings, SmtpTls};
pub use file::{FileDelivery, ReportFormat};
pub use webhook::WebhookDelivery;

/// A channel the finished report is offered to.
#[async_trait::async_trait]
pub trait DeliveryPort: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError>;
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub result: Result<(), DeliveryError>,
}

/// Per-channel results of one fan-out, in channel order.
#[derive(Debug, Default)]
pub struct DeliverySummary {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliverySummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.channel.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &DeliveryError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.channel.as_str(), e)))
    }
}

/// Offer `report` to every channel at once. A failing channel never stops the others.
pub async fn fan_out(channels: &[Arc<dyn DeliveryPort>], report: &Report) -> DeliverySummary {
    let outcomes = join_all(channels.iter().map(|channel| async move {
        let result = channel.deliver(report).await;
        match &result {
            Ok(()) => info!(channel = channel.name(), "delivery: report delivered"),
            Err(e) => warn!(channel = channel.name(), error = %e, "delivery: channel failed"),
        }
        DeliveryOutcome {
            channel: channel.name().to_string(),
            result,
        }
    }))
    .await;

    DeliverySummary { outcomes }
}
