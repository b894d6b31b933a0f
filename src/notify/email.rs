use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;

use super::NotifyError;

/// Client for an HTTP email delivery provider. The provider acknowledges an
/// accepted message with its own id, which we keep for status callbacks.
pub struct EmailClient {
    client: reqwest::Client,
    provider_url: String,
    api_key: Option<String>,
    from_address: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl EmailClient {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let provider_url = config
            .provider_url
            .clone()
            .ok_or(NotifyError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            provider_url,
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }

    /// Hand one message to the provider. Returns the provider's message id.
    pub async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotifyError> {
        let mut request = self.client.post(&self.provider_url).json(&SendRequest {
            from: &self.from_address,
            to: recipient,
            subject,
            body,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{}: {}", status, detail)));
        }

        let accepted: SendResponse = response.json().await?;
        Ok(accepted.id)
    }
}
