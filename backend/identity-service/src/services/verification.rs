/// SMS verification provider
///
/// The gate only needs two calls: dispatch a code and check one. Twilio
/// Verify is the production implementation; Twilio generates, stores and
/// expires the codes itself.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, warn};

use crate::config::TwilioSettings;
use crate::error::{IdentityError, Result};

const TWILIO_VERIFY_BASE: &str = "https://verify.twilio.com";

/// Outcome of a code check as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Approved,
    Pending,
    Canceled,
    Other(String),
}

impl From<&str> for VerificationStatus {
    fn from(status: &str) -> Self {
        match status {
            "approved" => VerificationStatus::Approved,
            "pending" => VerificationStatus::Pending,
            "canceled" => VerificationStatus::Canceled,
            other => VerificationStatus::Other(other.to_string()),
        }
    }
}

#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Dispatch a one-time code to `to` (E.164 phone, or an email address).
    async fn send_code(&self, to: &str) -> Result<()>;

    async fn check_code(&self, to: &str, code: &str) -> Result<VerificationStatus>;
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    status: String,
}

#[derive(Debug, Clone)]
pub struct TwilioVerifyClient {
    account_sid: String,
    auth_token: String,
    service_id: String,
    base_url: String,
    http: Client,
}

impl TwilioVerifyClient {
    pub fn new(settings: &TwilioSettings, http: Client) -> Self {
        Self {
            account_sid: settings.account_sid.clone(),
            auth_token: settings.auth_token.clone(),
            service_id: settings.service_id.clone(),
            base_url: TWILIO_VERIFY_BASE.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/v2/Services/{}/{}",
            self.base_url, self.service_id, resource
        )
    }

    async fn post(&self, resource: &str, form: &[(&str, &str)]) -> Result<VerificationResponse> {
        let response = self
            .http
            .post(self.url(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, resource, "Twilio request failed");
                IdentityError::Verification(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, resource, "Twilio returned an error");
            return Err(IdentityError::Verification(format!(
                "twilio returned {status}"
            )));
        }

        response
            .json::<VerificationResponse>()
            .await
            .map_err(|e| IdentityError::Verification(format!("malformed twilio response: {e}")))
    }
}

#[async_trait]
impl VerificationProvider for TwilioVerifyClient {
    async fn send_code(&self, to: &str) -> Result<()> {
        let channel = if to.contains('@') { "email" } else { "sms" };
        self.post("Verifications", &[("To", to), ("Channel", channel)])
            .await?;
        Ok(())
    }

    async fn check_code(&self, to: &str, code: &str) -> Result<VerificationStatus> {
        let response = self
            .post("VerificationCheck", &[("To", to), ("Code", code)])
            .await?;
        Ok(VerificationStatus::from(response.status.as_str()))
    }
}
