//! Operational notifications
//!
//! Purely observability: a failing notifier never affects ingestion.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Discord caps message content at 2000 characters
const WEBHOOK_CONTENT_LIMIT: usize = 2000;

/// Sink for info/error messages about ingestion progress
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn info(&self, message: &str);
    async fn error(&self, message: &str);
}

/// Writes notifications to the tracing subscriber only
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn info(&self, message: &str) {
        info!(target: "ahsnap::notify", "{}", message);
    }

    async fn error(&self, message: &str) {
        error!(target: "ahsnap::notify", "{}", message);
    }
}

/// Posts notifications to a Discord-compatible webhook and logs them
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    username: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, username: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            username: username.into(),
        })
    }

    async fn post(&self, level: &str, message: &str) {
        let mut content = format!("**[{}]** {}", level, message);
        if content.len() > WEBHOOK_CONTENT_LIMIT {
            let mut cut = WEBHOOK_CONTENT_LIMIT;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }

        let body = json!({ "username": self.username, "content": content });
        let result = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!(error = %e, "Failed to deliver webhook notification");
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn info(&self, message: &str) {
        info!(target: "ahsnap::notify", "{}", message);
        self.post("INFO", message).await;
    }

    async fn error(&self, message: &str) {
        error!(target: "ahsnap::notify", "{}", message);
        self.post("ERROR", message).await;
    }
}

/// Severity of a queued notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Hands notifications to a background task that delivers them in order
///
/// Enqueueing never waits on delivery. The task drains its backlog and exits
/// once every clone of the queue is dropped.
#[derive(Debug, Clone)]
pub struct NotifyQueue {
    tx: mpsc::UnboundedSender<(Level, String)>,
}

impl NotifyQueue {
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Level, String)>();
        let handle = tokio::spawn(async move {
            while let Some((level, message)) = rx.recv().await {
                match level {
                    Level::Info => notifier.info(&message).await,
                    Level::Error => notifier.error(&message).await,
                }
            }
        });
        (Self { tx }, handle)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    fn push(&self, level: Level, message: String) {
        if self.tx.send((level, message)).is_err() {
            warn!("Notification dropped, delivery task has stopped");
        }
    }
}
