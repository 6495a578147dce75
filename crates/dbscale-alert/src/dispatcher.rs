//! Alert dispatcher — bounded queue plus background delivery task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dbscale_core::config::AlertConfig;
use dbscale_core::ports::AlertSink;
use dbscale_core::Alert;

use crate::channel::{AlertChannel, LogChannel, SlackChannel, WebhookChannel};

/// Non-blocking `AlertSink`. Cloning shares the queue.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
    dropped: Arc<AtomicU64>,
}

impl AlertDispatcher {
    /// Spawn the delivery task for `channels`.
    ///
    /// The task ends once every dispatcher clone is dropped and the queue
    /// has drained.
    pub fn spawn(channels: Vec<Arc<dyn AlertChannel>>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel(capacity);
        let handle = tokio::spawn(deliver_loop(rx, channels));
        (dispatcher, handle)
    }

    /// Build channels from configuration and spawn the delivery task.
    ///
    /// The log channel is always present; webhook and Slack delivery only
    /// when alerts are enabled and a URL is configured.
    pub fn from_config(config: &AlertConfig) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let timeout = Duration::from_secs(config.timeout);
        let mut channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(LogChannel)];

        if config.enabled {
            if let Some(url) = &config.webhook_url {
                channels.push(Arc::new(WebhookChannel::new(url, timeout)?));
            }
            if let Some(url) = &config.slack_webhook {
                channels.push(Arc::new(SlackChannel::new(url, timeout)?));
            }
        }

        info!(
            channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "alert dispatcher configured"
        );
        Ok(Self::spawn(channels, config.queue_capacity))
    }

    fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Alerts discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for AlertDispatcher {
    fn notify(&self, alert: Alert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(cluster_id = %alert.cluster_id(), "alert queue full, dropping alert");
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                warn!(cluster_id = %alert.cluster_id(), "alert worker stopped, dropping alert");
            }
        }
    }
}

async fn deliver_loop(mut rx: mpsc::Receiver<Alert>, channels: Vec<Arc<dyn AlertChannel>>) {
    while let Some(alert) = rx.recv().await {
        for channel in &channels {
            match channel.deliver(&alert).await {
                Ok(()) => debug!(channel = channel.name(), cluster_id = %alert.cluster_id(), "alert delivered"),
                Err(e) => warn!(
                    channel = channel.name(),
                    cluster_id = %alert.cluster_id(),
                    error = %e,
                    "alert delivery failed"
                ),
            }
        }
    }
    debug!("alert worker exiting");
}
