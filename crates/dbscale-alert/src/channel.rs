//! Alert delivery channels.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use dbscale_core::{Alert, Severity};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint answered {0}")]
    Status(u16),
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

// ── Log ───────────────────────────────────────────────────────────

/// Writes alerts to the tracing log at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let cluster_id = alert.cluster_id();
        let summary = alert.summary();
        match alert.severity() {
            Severity::Info => info!(%cluster_id, "alert: {summary}"),
            Severity::Warning => warn!(%cluster_id, "alert: {summary}"),
            Severity::Critical => error!(%cluster_id, "alert: {summary}"),
        }
        Ok(())
    }
}

// ── Webhook ───────────────────────────────────────────────────────

/// POSTs a flat JSON document per alert.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        post_json(&self.client, &self.url, &webhook_payload(alert)).await
    }
}

/// Body sent to a generic webhook.
pub fn webhook_payload(alert: &Alert) -> Value {
    let severity = alert.severity();
    let mut payload = json!({
        "timestamp": alert.timestamp(),
        "cluster_name": alert.cluster_id(),
        "severity": severity,
        "message": alert.summary(),
    });

    let details = match alert {
        Alert::Scaling(event) => json!({
            "type": "scaling",
            "action": event.direction.map(|d| d.to_string()).unwrap_or_else(|| "resize".to_string()),
            "from_size": event.from_size,
            "to_size": event.to_size,
            "reason": event.triggering_metrics.join("; "),
            "forced": event.forced,
            "outcome": event.outcome,
            "error": event.error,
        }),
        Alert::DegradedData(event) => json!({
            "type": "degraded_data",
            "missing": event.missing,
        }),
        Alert::ThresholdBreach { breaches, .. } => json!({
            "type": "threshold_breach",
            "alerts": breaches,
        }),
        Alert::MetricsUnavailable { error, .. } => json!({
            "type": "metrics_unavailable",
            "error": error,
        }),
    };

    if let (Some(body), Value::Object(extra)) = (payload.as_object_mut(), details) {
        body.extend(extra);
    }
    payload
}

// ── Slack ─────────────────────────────────────────────────────────

/// Slack incoming-webhook channel.
#[derive(Debug, Clone)]
pub struct SlackChannel {
    client: reqwest::Client,
    url: String,
}

impl SlackChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        post_json(&self.client, &self.url, &slack_message(alert)).await
    }
}

/// Slack attachment message for an alert.
pub fn slack_message(alert: &Alert) -> Value {
    let cluster = alert.cluster_id();
    let field = |title: &str, value: String, short: bool| {
        json!({ "title": title, "value": value, "short": short })
    };

    let (text, color, fields) = match alert {
        Alert::Scaling(event) => {
            let action = match event.direction {
                Some(d) => d.to_string().replace('_', " "),
                None => "resize".to_string(),
            };
            let color = match (&event.error, event.direction) {
                (Some(_), _) => "danger",
                (None, Some(dbscale_core::ScaleDirection::Up)) => "good",
                (None, _) => "warning",
            };
            let mut fields = vec![
                field("Action", action, true),
                field("Size Change", format!("{} → {}", event.from_size, event.to_size), true),
                field("Reason", event.triggering_metrics.join("\n"), false),
            ];
            if let Some(err) = &event.error {
                fields.push(field("Error", err.detail.clone(), false));
            }
            (format!("Scaling action: {cluster}"), color, fields)
        }
        Alert::ThresholdBreach { breaches, .. } => (
            format!("Threshold alert: {cluster}"),
            "warning",
            vec![
                field("Cluster", cluster.to_string(), true),
                field(
                    "Alerts",
                    breaches
                        .iter()
                        .map(|b| format!("• {b}"))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    false,
                ),
            ],
        ),
        Alert::DegradedData(event) => (
            format!("No metric data: {cluster}"),
            "danger",
            vec![field("Missing", event.missing.join(", "), false)],
        ),
        Alert::MetricsUnavailable { error, .. } => (
            format!("Metrics unavailable: {cluster}"),
            "danger",
            vec![field("Error", error.clone(), false)],
        ),
    };

    json!({
        "text": text,
        "attachments": [{ "color": color, "fields": fields, "ts": alert.timestamp() }],
    })
}

async fn post_json(client: &reqwest::Client, url: &str, body: &Value) -> Result<(), DeliveryError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DeliveryError::Status(status.as_u16()));
    }
    Ok(())
}
