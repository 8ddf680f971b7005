/// Two-factor gate (SMS one-time codes)
///
/// Sits between identity resolution and token issuance. A user without a
/// phone enrols one on their first successful check; afterwards every login
/// requires a code sent to that phone.
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TwilioSettings;
use crate::db::UserStore;
use crate::error::{IdentityError, Result};
use crate::models::User;
use crate::security::TokenIssuer;
use crate::services::verification::{
    TwilioVerifyClient, VerificationProvider, VerificationStatus,
};

#[derive(Clone)]
pub struct TwoFactorGate {
    verifier: Option<Arc<dyn VerificationProvider>>,
    users: Arc<dyn UserStore>,
    issuer: Arc<TokenIssuer>,
}

impl TwoFactorGate {
    /// `verifier: None` disables the second factor.
    pub fn new(
        verifier: Option<Arc<dyn VerificationProvider>>,
        users: Arc<dyn UserStore>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            verifier,
            users,
            issuer,
        }
    }

    pub fn from_settings(
        settings: &TwilioSettings,
        http: Client,
        users: Arc<dyn UserStore>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        let verifier = settings.is_enabled().then(|| {
            Arc::new(TwilioVerifyClient::new(settings, http)) as Arc<dyn VerificationProvider>
        });
        Self::new(verifier, users, issuer)
    }

    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    fn verifier(&self) -> Result<&Arc<dyn VerificationProvider>> {
        self.verifier.as_ref().ok_or(IdentityError::TwoFANotEnabled)
    }

    /// Dispatch a code to `phone` and return a session token bound to
    /// `(user_id, phone)` for the follow-up check.
    pub async fn send_code(&self, user_id: Uuid, phone: &str) -> Result<String> {
        let verifier = self.verifier()?;
        let phone = normalize_phone(phone)?;

        verifier.send_code(&phone).await.map_err(|e| {
            warn!(
                user_id = %user_id,
                phone = %mask_phone(&phone),
                error = %e,
                "Failed to send verification code"
            );
            e
        })?;

        info!(user_id = %user_id, phone = %mask_phone(&phone), "Verification code sent");
        self.issuer.issue_session(user_id, &phone, Utc::now())
    }

    /// Check `code` for `phone`. On approval the phone is stored on the user
    /// and the updated user is returned.
    pub async fn check_code(&self, user_id: Uuid, phone: &str, code: &str) -> Result<User> {
        let verifier = self.verifier()?;
        let phone = normalize_phone(phone)?;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        match verifier.check_code(&phone, code.trim()).await? {
            VerificationStatus::Approved => {}
            status => {
                warn!(
                    user_id = %user_id,
                    phone = %mask_phone(&phone),
                    ?status,
                    "Verification code rejected"
                );
                return Err(IdentityError::InvalidTwoFACode);
            }
        }

        self.users.set_phone(user_id, &phone).await?;
        user.phone = phone;

        info!(user_id = %user_id, "Second factor verified");
        Ok(user)
    }
}

fn normalize_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(IdentityError::Validation(
            "phone number is required".to_string(),
        ));
    }
    Ok(phone.to_string())
}

/// Mask phone number for logging (show last 4 digits only)
fn mask_phone(phone: &str) -> String {
    let count = phone.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let visible: String = phone.chars().skip(count - 4).collect();
    format!("****{}", visible)
}
