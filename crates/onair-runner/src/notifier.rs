use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Subject and plain-text body of an operator alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Outbound alert channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Delivers `notification`, logging and swallowing delivery failures.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(error) = notifier
        .notify(&notification.subject, &notification.body)
        .await
    {
        warn!(
            subject = %notification.subject,
            error = %format!("{error:#}"),
            "failed to deliver notification"
        );
    }
}

/// Notifier that writes alerts to the log at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        error!(subject, body, "operator alert");
        Ok(())
    }
}

/// Notifier that POSTs `{"subject", "body"}` JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            bail!("webhook url cannot be empty");
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .context("failed to create webhook client")?;
        Ok(Self {
            http,
            url: url.trim().to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "subject": subject, "body": body }))
            .send()
            .await
            .with_context(|| format!("failed to post notification to {}", self.url))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("notification webhook rejected alert: status={status} body={text}");
        }
        Ok(())
    }
}

/// Notifier that keeps every alert in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|notification| notification.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().await.push(Notification::new(subject, body));
        Ok(())
    }
}
