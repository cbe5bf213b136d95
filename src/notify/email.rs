//! Email provider boundary
//!
//! The provider is an opaque external collaborator; the dispatcher only
//! cares whether a send landed, may land on retry, or will never land.

use async_trait::async_trait;
use serde::Serialize;

/// Outcome of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Delivered,

    /// Worth retrying with backoff (timeouts, 5xx)
    TransientFailure(String),

    /// Never retried (invalid recipient, rejected content)
    PermanentFailure(String),
}

/// External email-sending collaborator
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> ProviderResult;
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Provider speaking the HTTP mail-send API of a hosted email service.
pub struct HttpEmailProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmailProvider {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> ProviderResult {
        let payload = MailPayload {
            recipient,
            subject,
            body,
        };

        let response = self.client.post(&self.endpoint).json(&payload).send().await;

        match response {
            Ok(response) if response.status().is_success() => ProviderResult::Delivered,
            Ok(response) if response.status().is_client_error() => {
                ProviderResult::PermanentFailure(format!(
                    "provider rejected send: {}",
                    response.status()
                ))
            }
            Ok(response) => {
                ProviderResult::TransientFailure(format!("provider error: {}", response.status()))
            }
            Err(e) => ProviderResult::TransientFailure(e.to_string()),
        }
    }
}

/// Sandbox provider that only logs, for demo wiring and local runs.
#[derive(Debug, Default)]
pub struct LoggingEmailProvider;

#[async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> ProviderResult {
        tracing::info!(recipient, subject, body, "Email delivered (sandbox)");
        ProviderResult::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_provider_always_delivers() {
        let result =
            tokio_test::block_on(LoggingEmailProvider.send("holder@example.com", "s", "b"));
        assert_eq!(result, ProviderResult::Delivered);
    }
}
