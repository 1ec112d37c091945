//! Pluggable notification channel fan-out.
//!
//! The alert engine never awaits a send directly — `NotificationDispatcher`
//! spawns one task per enabled channel with its own timeout, and a channel
//! failure never affects the others or the triggering alert record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::constants::alerts::NOTIFICATION_TIMEOUT_SECONDS;

#[derive(Debug, Clone, Serialize)]
pub struct NotifyPayload {
    pub agent_id: String,
    pub agent_name: String,
    pub rule_tag: String,
    pub level: String,
    pub status: String,
    pub message: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub fired_at_ms: i64,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, payload: &NotifyPayload) -> anyhow::Result<()>;
}

pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &NotifyPayload) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "webhook '{}' returned HTTP {}",
                self.name,
                response.status()
            ));
        }
        Ok(())
    }
}

/// Fans a single alert event out to every configured channel, each on its
/// own task with its own 30s deadline. Notification dispatch is never
/// awaited by the firing path.
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Fire-and-forget: spawns the fan-out and returns immediately. A
    /// panicking channel implementation cannot poison the caller because
    /// tokio isolates panics to the spawned task.
    pub fn dispatch(&self, payload: NotifyPayload) {
        for channel in self.channels.clone() {
            let payload = payload.clone();
            tokio::spawn(async move {
                let deadline = Duration::from_secs(NOTIFICATION_TIMEOUT_SECONDS);
                match tokio::time::timeout(deadline, channel.send(&payload)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(channel = channel.name(), error = %e, "notification channel send failed");
                    }
                    Err(_) => {
                        warn!(channel = channel.name(), "notification channel send timed out");
                    }
                }
            });
        }
    }
}

impl Clone for NotificationDispatcher {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyChannel {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn send(&self, _payload: &NotifyPayload) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("always fails"))
        }
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_propagate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = NotificationDispatcher::new(vec![Arc::new(FlakyChannel { calls: calls.clone() })]);
        dispatcher.dispatch(NotifyPayload {
            agent_id: "a1".into(),
            agent_name: "probe-1".into(),
            rule_tag: "cpu".into(),
            level: "warning".into(),
            status: "firing".into(),
            message: "cpu high".into(),
            threshold: 80.0,
            actual_value: 90.0,
            fired_at_ms: 0,
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
