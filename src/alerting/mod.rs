//! Alerting module for webhook notifications.
//!
//! Emitted anomaly verdicts above a severity floor are dispatched
//! asynchronously to Slack and generic webhooks. The sync pipeline side
//! hands verdicts to a bounded queue with `try_send`; a full queue drops
//! the alert with a warning instead of blocking verdict emission.

use crate::config::{AlertConfig, SlackConfig, WebhookConfig};
use crate::models::{Severity, Verdict};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Async alert dispatcher, run as a tokio task
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the bounded channel between pipeline and dispatcher
    pub fn create_channel() -> (mpsc::Sender<Verdict>, mpsc::Receiver<Verdict>) {
        mpsc::channel(100)
    }

    /// Receive verdicts from the channel and dispatch them to every
    /// configured channel until the queue closes
    pub async fn run(self, mut rx: mpsc::Receiver<Verdict>) {
        log::info!("Alert dispatcher started");

        while let Some(verdict) = rx.recv().await {
            if !self.config.enabled || !verdict.is_anomaly {
                continue;
            }
            if verdict.severity < self.config.min_severity {
                log::debug!(
                    "Skipping alert for {} (severity {} < min {})",
                    verdict.window_key,
                    verdict.severity,
                    self.config.min_severity
                );
                continue;
            }

            log::info!(
                "Dispatching alert: {} (severity {})",
                verdict.window_key,
                verdict.severity
            );
            if let Err(e) = self.dispatch_alert(&verdict).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    async fn dispatch_alert(&self, verdict: &Verdict) -> Result<(), AlertError> {
        let mut errors = Vec::new();

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, verdict).await {
                log::error!("Slack alert failed: {}", e);
                errors.push(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, verdict).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                errors.push(e);
            }
        }

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_slack_alert(
        &self,
        config: &SlackConfig,
        verdict: &Verdict,
    ) -> Result<(), AlertError> {
        let (emoji, color) = match verdict.severity {
            Severity::High => (":rotating_light:", "danger"),
            Severity::Medium => (":warning:", "warning"),
            Severity::Low => (":information_source:", "good"),
        };

        let rules = if verdict.contributing_rules.is_empty() {
            "model only".to_string()
        } else {
            verdict.contributing_rules.join(", ")
        };
        let model = match &verdict.model_score {
            Some(s) => format!("{:.3} (v{})", s.score, s.model_version),
            None => "n/a".to_string(),
        };

        let payload = serde_json::json!({
            "channel": config.channel,
            "username": config.username.as_deref().unwrap_or("LADS"),
            "icon_emoji": ":shield:",
            "attachments": [{
                "color": color,
                "title": format!("{} Login anomaly: {}", emoji, verdict.window_key.key),
                "fields": [
                    { "title": "Dimension", "value": verdict.window_key.dimension.to_string(), "short": true },
                    { "title": "Severity", "value": verdict.severity.to_string(), "short": true },
                    { "title": "Rules", "value": rules, "short": true },
                    { "title": "Model score", "value": model, "short": true },
                ],
                "text": format!("Window {}", verdict.window_key),
                "ts": verdict.emitted_at.timestamp(),
            }]
        });

        let response = self
            .client
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Slack returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        verdict: &Verdict,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(verdict).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

/// Sync-friendly handle for queueing alerts from the pipeline loop
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<Verdict>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<Verdict>) -> Self {
        AlertQueue { tx }
    }

    /// Queue a verdict for dispatch without blocking; a full queue
    /// drops the alert and logs a warning
    pub fn queue_alert(&self, verdict: Verdict) {
        if let Err(e) = self.tx.try_send(verdict) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    /// Queue a verdict (async version)
    pub async fn queue_alert_async(&self, verdict: Verdict) -> Result<(), AlertError> {
        self.tx
            .send(verdict)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
