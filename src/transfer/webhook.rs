//! Smart-wallet webhook notification
//!
//! A credit to a wallet with a webhook is POSTed to that URL before the
//! unit commits. Any transport error, timeout or non-2xx status fails
//! the unit. Delivery is at-most-once from the ledger's point of view;
//! the endpoint may see a transaction that never commits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core_types::Assets;

/// JSON body POSTed to the webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Sender wallet address
    pub sender: String,
    /// Receiving (smart) wallet address
    pub wallet: String,
    pub assets: Assets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum WebhookError {
    #[error("webhook timed out")]
    Timeout,

    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook rejected with HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError>;
}

/// reqwest-backed notifier
pub struct HttpWebhookNotifier {
    client: reqwest::Client,
}

impl HttpWebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                WebhookError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Timeout
                } else {
                    WebhookError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Rejected(status.as_u16()));
        }

        tracing::debug!(url, wallet = %payload.wallet, "Webhook accepted");
        Ok(())
    }
}

/// Recording notifier for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MockWebhook {
        calls: AtomicUsize,
        payloads: Mutex<Vec<(String, WebhookPayload)>>,
        fail_with: Mutex<Option<WebhookError>>,
    }

    impl MockWebhook {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every call with `error` (`None` to succeed again)
        pub fn set_fail(&self, error: Option<WebhookError>) {
            *self.fail_with.lock().unwrap() = error;
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn payloads(&self) -> Vec<(String, WebhookPayload)> {
            self.payloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookNotifier for MockWebhook {
        async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads
                .lock()
                .unwrap()
                .push((url.to_string(), payload.clone()));
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}
