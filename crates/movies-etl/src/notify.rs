//! Operator alerts
//!
//! Alerts are fire-and-forget from the pipeline's point of view: a failed
//! delivery is logged by the caller and never changes a run's outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::config::AlertConfig;

/// Timeout for a single webhook delivery
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Alert delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert endpoint answered {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    DataFileMissing,
    ValidationErrors,
    PipelineFailure,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::DataFileMissing => "data_file_missing",
            AlertCategory::ValidationErrors => "validation_errors",
            AlertCategory::PipelineFailure => "pipeline_failure",
        }
    }
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message for the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub category: AlertCategory,
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        category: AlertCategory,
        subject: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            category,
            subject: subject.into(),
            body: body.into(),
            recipient: recipient.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn data_file_missing(pipeline: &str, path: &std::path::Path, recipient: &str) -> Self {
        Self::new(
            AlertCategory::DataFileMissing,
            format!("[{}] Data file missing", pipeline),
            format!("The source file {} does not exist. Nothing was loaded.", path.display()),
            recipient,
        )
    }

    pub fn validation_errors(pipeline: &str, errors: &[String], recipient: &str) -> Self {
        Self::new(
            AlertCategory::ValidationErrors,
            format!("[{}] Data validation errors detected", pipeline),
            format!(
                "Validation failed, the batch was not loaded:\n{}",
                errors
                    .iter()
                    .map(|e| format!("- {}", e))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            recipient,
        )
    }

    pub fn pipeline_failure(pipeline: &str, phase: &str, cause: &str, recipient: &str) -> Self {
        Self::new(
            AlertCategory::PipelineFailure,
            format!("[{}] Pipeline failed during {}", pipeline, phase),
            format!("The run was rolled back. Cause: {}", cause),
            recipient,
        )
    }
}

/// Delivery channel for alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        error!(
            category = %alert.category,
            recipient = %alert.recipient,
            subject = %alert.subject,
            body = %alert.body,
            "Alert raised"
        );
        Ok(())
    }
}

/// POSTs alerts as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(alert).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(category = %alert.category, url = %self.url, "Alert delivered");
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise
pub fn notifier_from_config(config: &AlertConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
