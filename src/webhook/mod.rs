//! Success/failure notifications
//!
//! After every run exactly one of the two configured requests is sent. An
//! outcome without a URL is a silent no-op. Delivery errors are returned to
//! the caller, which logs them; they never change the run's result.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;

use crate::config::{WebhookEvent, WebhookSettings};
use crate::error::WebhookError;

/// Final state of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Success => write!(f, "success"),
            SyncOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// Delivers the outcome of a run
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, outcome: SyncOutcome) -> Result<(), WebhookError>;
}

/// HTTP webhook notifier
pub struct WebhookClient {
    http: Client,
    settings: WebhookSettings,
}

impl WebhookClient {
    pub fn new(http: Client, settings: WebhookSettings) -> Self {
        Self { http, settings }
    }

    /// Build the notifier with its own HTTP client
    pub fn from_settings(settings: WebhookSettings) -> Result<Self, reqwest::Error> {
        let http = settings.client.build_http_client()?;
        Ok(Self::new(http, settings))
    }

    fn event(&self, outcome: SyncOutcome) -> &WebhookEvent {
        match outcome {
            SyncOutcome::Success => &self.settings.success,
            SyncOutcome::Failure => &self.settings.failure,
        }
    }
}

#[async_trait]
impl Notifier for WebhookClient {
    async fn notify(&self, outcome: SyncOutcome) -> Result<(), WebhookError> {
        let event = self.event(outcome);
        let Some(url) = &event.url else {
            debug!(outcome = %outcome, "No webhook configured");
            return Ok(());
        };

        let method = Method::from_bytes(event.method.to_uppercase().as_bytes())
            .map_err(|_| WebhookError::InvalidMethod(event.method.clone()))?;
        let headers = header_map(event)?;

        let response = self
            .http
            .request(method, url)
            .headers(headers)
            .body(event.body.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(WebhookError::Status(status.as_u16()));
        }

        debug!(outcome = %outcome, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

fn header_map(event: &WebhookEvent) -> Result<HeaderMap, WebhookError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &event.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| WebhookError::InvalidHeader(name.as_str().to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
