/// Login orchestration
///
/// Drives the OAuth login, the optional second factor and the refresh-token
/// lifecycle:
///
/// - `login` / `callback`: authorization-code flow with PKCE and single-use state
/// - `phone` / `verify`: SMS second factor
/// - `refresh`: access-token short-circuit, else single-use refresh rotation
/// - `force_refresh`: administrative re-issue after entitlement changes
/// - `logout`: refresh-token revocation
///
/// Every public operation runs under the configured context timeout; dropping
/// the future cancels any outstanding provider or database call.
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{FlowSettings, Settings};
use crate::db::{
    PendingAuthStore, PgPendingAuthStore, PgSubscriptionStore, PgUserStore, UserStore,
};
use crate::error::{IdentityError, Result};
use crate::models::user::composite_sub;
use crate::models::{
    AuthTokens, AuthUser, CallbackResponse, LoginResponse, NewUser, PendingAuth, PendingLogin,
    PhoneResponse, RefreshStatus, RefreshToken, User,
};
use crate::security::{pkce, TokenIssuer};
use crate::services::access::AccessPolicy;
use crate::services::oauth::{authorization_url, build_http_client, ProviderRegistry};
use crate::services::two_fa::TwoFactorGate;

/// Random bytes behind a login state value
const STATE_BYTES: usize = 32;

/// Random bytes behind a new user's API key
const API_KEY_BYTES: usize = 24;

/// Host label prefix of preview deployments, e.g. `pr-42.app.example.com`
const PREVIEW_LABEL_PREFIX: &str = "pr-";

pub struct LoginOrchestrator {
    registry: ProviderRegistry,
    pending: Arc<dyn PendingAuthStore>,
    users: Arc<dyn UserStore>,
    policy: AccessPolicy,
    issuer: Arc<TokenIssuer>,
    gate: TwoFactorGate,
    settings: FlowSettings,
    routing_tag: Option<String>,
}

impl LoginOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        pending: Arc<dyn PendingAuthStore>,
        users: Arc<dyn UserStore>,
        policy: AccessPolicy,
        issuer: Arc<TokenIssuer>,
        gate: TwoFactorGate,
        settings: FlowSettings,
    ) -> Self {
        let routing_tag = routing_tag(&settings.base_url);
        Self {
            registry,
            pending,
            users,
            policy,
            issuer,
            gate,
            settings,
            routing_tag,
        }
    }

    /// Production wiring: PostgreSQL stores, configured providers, Twilio Verify.
    pub fn from_settings(settings: &Settings, pool: PgPool) -> anyhow::Result<Self> {
        let http = build_http_client(settings.flow.context_timeout())?;
        let issuer = Arc::new(TokenIssuer::from_settings(&settings.jwt)?);
        let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
        let pending: Arc<dyn PendingAuthStore> = Arc::new(PgPendingAuthStore::new(pool.clone()));
        let policy = AccessPolicy::new(Arc::new(PgSubscriptionStore::new(pool)));
        let registry = ProviderRegistry::from_settings(&settings.oauth, http.clone());
        let gate =
            TwoFactorGate::from_settings(&settings.twilio, http, users.clone(), issuer.clone());

        Ok(Self::new(
            registry,
            pending,
            users,
            policy,
            issuer,
            gate,
            settings.flow.clone(),
        ))
    }

    pub fn two_factor_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Start an OAuth login and return the provider authorization URL.
    pub async fn login(&self, return_url: &str, provider: &str) -> Result<LoginResponse> {
        self.with_deadline("login", self.start_login(return_url, provider))
            .await
    }

    /// Complete an OAuth login from the provider redirect.
    pub async fn callback(&self, state: &str, code: &str) -> Result<CallbackResponse> {
        self.with_deadline("callback", self.complete_login(state, code))
            .await
    }

    /// Send a code to `phone` for a user enrolling or re-entering the second factor.
    pub async fn phone(&self, user_id: Uuid, phone: &str) -> Result<PhoneResponse> {
        self.with_deadline("phone", async {
            let session_token = self.gate.send_code(user_id, phone).await?;
            Ok(PhoneResponse { session_token })
        })
        .await
    }

    /// Check a second-factor code and issue tokens on success.
    pub async fn verify(&self, user_id: Uuid, phone: &str, code: &str) -> Result<AuthTokens> {
        self.with_deadline("verify", async {
            let user = self.gate.check_code(user_id, phone, code).await?;
            self.create_auth_tokens(&user, None).await
        })
        .await
    }

    /// Exchange a refresh token for a new pair, unless the access token is still valid.
    pub async fn refresh(&self, access_token: &str, refresh_token: &str) -> Result<AuthTokens> {
        self.with_deadline("refresh", self.rotate(access_token, refresh_token))
            .await
    }

    /// Issue a new pair without validating any token.
    pub async fn force_refresh(&self, user_id: Uuid) -> Result<AuthTokens> {
        self.with_deadline("force_refresh", async {
            let user = self.load_user(user_id).await?;
            info!(user_id = %user_id, "Force-refreshing tokens");
            self.create_auth_tokens(&user, None).await
        })
        .await
    }

    /// Revoke the row behind a refresh token. Expired tokens may still be revoked.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.with_deadline("logout", async {
            let claims = self.issuer.validate_refresh_allow_expired(refresh_token)?;
            if !self.pending.revoke_refresh(&claims.jti).await? {
                return Err(IdentityError::RefreshTokenNotFound);
            }
            info!(user_id = %claims.sub, "Refresh token revoked");
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Flows
    // ========================================================================

    async fn start_login(&self, return_url: &str, provider: &str) -> Result<LoginResponse> {
        let client = self.registry.resolve(provider)?;

        let state = self.new_state()?;
        let verifier = pkce::generate_code_verifier()?;
        let challenge = pkce::generate_code_challenge(&verifier)?;
        let url = authorization_url(client.client_config(), &state, &challenge)?;

        let record = PendingAuth::Login(PendingLogin {
            state,
            provider: client.provider(),
            verifier,
            return_url: return_url.to_string(),
            expires: Utc::now() + self.issuer.access_ttl(),
        });
        self.pending.insert(&record).await.map_err(|e| {
            error!(provider = %client.provider(), error = %e, "Failed to persist login attempt");
            IdentityError::LoginStartFailed(e.to_string())
        })?;

        info!(provider = %client.provider(), "OAuth login started");
        Ok(LoginResponse { url })
    }

    async fn complete_login(&self, state: &str, code: &str) -> Result<CallbackResponse> {
        let now = Utc::now();
        let login = match self.pending.find(state).await? {
            Some(PendingAuth::Login(login)) => login,
            _ => return Err(IdentityError::LoginNotFound),
        };
        if login.is_expired(now) {
            return Err(IdentityError::LoginExpired);
        }
        // Single use: a replayed or concurrent callback loses here
        if !self.pending.consume_login(state, now).await? {
            warn!(provider = %login.provider, "Login state already consumed");
            return Err(IdentityError::LoginExpired);
        }

        let client = self.registry.get(login.provider)?;
        let provider_token = client.exchange_code(code, &login.verifier).await?;
        let identity = client.fetch_identity(&provider_token).await?;
        if identity.is_empty() {
            return Err(IdentityError::OAuthError(format!(
                "{} returned no identity",
                login.provider
            )));
        }

        let sub = composite_sub(login.provider.as_str(), &identity.subject);
        let user = match self.users.find_by_identity(&identity.email, &sub).await? {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create(NewUser {
                        email: identity.email,
                        sub,
                        avatar: identity.avatar_url,
                        access: self.settings.default_access,
                        api_key: crypto_core::random::random_hex(API_KEY_BYTES)?,
                    })
                    .await?;
                info!(
                    user_id = %user.id,
                    provider = %login.provider,
                    "Created user on first login"
                );
                user
            }
        };

        if !self.gate.is_enabled() {
            let tokens = self.create_auth_tokens(&user, None).await?;
            info!(user_id = %user.id, "Login completed");
            return Ok(CallbackResponse {
                access_token: Some(tokens.access_token),
                refresh_token: Some(tokens.refresh_token),
                return_url: login.return_url,
                session_token: None,
                has_phone: user.has_phone(),
                user: Some(tokens.user),
                fresh: true,
            });
        }

        let session_token = if user.has_phone() {
            self.gate.send_code(user.id, &user.phone).await?
        } else {
            self.issuer.issue_session(user.id, "", now)?
        };

        info!(user_id = %user.id, has_phone = user.has_phone(), "Login awaiting second factor");
        Ok(CallbackResponse {
            return_url: login.return_url,
            session_token: Some(session_token),
            has_phone: user.has_phone(),
            ..Default::default()
        })
    }

    async fn rotate(&self, access_token: &str, refresh_token: &str) -> Result<AuthTokens> {
        // A still-valid access token wins; nothing is rotated
        if let Ok(claims) = self.issuer.validate_access(access_token) {
            let user = self.load_user(claims.sub).await?;
            let entitlements = self.policy.derive(&user).await?;
            debug!(user_id = %claims.sub, "Access token still valid, refresh skipped");
            return Ok(AuthTokens {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                user: claims.user(),
                entitlements,
                fresh: false,
            });
        }

        let claims = self.issuer.validate_refresh(refresh_token)?;
        let now = Utc::now();

        let row = match self.pending.find(&claims.jti).await? {
            Some(PendingAuth::Refresh(row)) => row,
            _ => return Err(IdentityError::RefreshTokenNotFound),
        };

        match row.status(now) {
            RefreshStatus::Revoked => {
                warn!(user_id = %claims.sub, "Revoked refresh token presented");
                return Err(IdentityError::TokenRevoked);
            }
            RefreshStatus::Expired => return Err(IdentityError::TokenExpired),
            RefreshStatus::Rotated => {
                warn!(user_id = %claims.sub, "Rotated refresh token presented again");
                return Err(IdentityError::TokenAlreadyRotated);
            }
            RefreshStatus::Issued => {}
        }

        let grace = chrono::Duration::from_std(self.settings.rotation_grace())
            .map_err(|e| IdentityError::Internal(format!("invalid rotation grace: {e}")))?;
        let user_id = row.user_id.ok_or(IdentityError::TokenRevoked)?;
        let user = self.load_user(user_id).await?;

        // Store and sign the replacement before claiming the presented row
        let (tokens, replacement_id) = self.issue_pair(&user, Some(row.id.clone())).await?;

        if !self.pending.rotate_refresh(&row.id, now, now + grace).await? {
            warn!(user_id = %claims.sub, "Lost refresh rotation race");
            if let Err(e) = self.pending.revoke_refresh(&replacement_id).await {
                warn!(
                    user_id = %claims.sub,
                    error = %e,
                    "Failed to revoke unused replacement row"
                );
            }
            return Err(IdentityError::TokenAlreadyRotated);
        }

        self.record_activity(user.id, now);
        Ok(tokens)
    }

    /// Insert a new Issued refresh row and sign the pair for `user`.
    async fn create_auth_tokens(
        &self,
        user: &User,
        rotated_from: Option<String>,
    ) -> Result<AuthTokens> {
        let (tokens, _) = self.issue_pair(user, rotated_from).await?;
        Ok(tokens)
    }

    /// Same as `create_auth_tokens`, also returning the new row id.
    async fn issue_pair(
        &self,
        user: &User,
        rotated_from: Option<String>,
    ) -> Result<(AuthTokens, String)> {
        let now = Utc::now();
        let entitlements = self.policy.derive(user).await?;

        let row = RefreshToken::issue(
            Uuid::new_v4().to_string(),
            user.id,
            now + self.issuer.refresh_ttl(),
            rotated_from,
        );
        self.pending.insert(&PendingAuth::Refresh(row.clone())).await?;

        let refresh_token = self.issuer.issue_refresh(&row, now)?;
        let access_token = self.issuer.issue_access(user, entitlements, now)?;

        let tokens = AuthTokens {
            access_token,
            refresh_token,
            user: AuthUser::new(user, entitlements),
            entitlements,
            fresh: true,
        };
        Ok((tokens, row.id))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load_user(&self, user_id: Uuid) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    fn new_state(&self) -> Result<String> {
        let token = crypto_core::random::random_token(STATE_BYTES)?;
        Ok(match &self.routing_tag {
            Some(tag) => format!("{tag}.{token}"),
            None => token,
        })
    }

    /// Detached `last_active_at` stamp with its own timeout. Failures are logged only.
    fn record_activity(&self, user_id: Uuid, at: DateTime<Utc>) {
        let users = Arc::clone(&self.users);
        let limit = self.settings.context_timeout();

        tokio::spawn(async move {
            match tokio::time::timeout(limit, users.touch_last_active(user_id, at)).await {
                Ok(Ok(())) => debug!(user_id = %user_id, "Recorded refresh activity"),
                Ok(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "Failed to record refresh activity")
                }
                Err(_) => warn!(
                    user_id = %user_id,
                    timeout_secs = limit.as_secs(),
                    "Timed out recording refresh activity"
                ),
            }
        });
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.settings.context_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, timeout_secs = limit.as_secs(), "Operation timed out");
                Err(IdentityError::Timeout(limit))
            }
        }
    }
}

/// Preview-deployment tag taken from the first host label of `base_url`.
fn routing_tag(base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    let label = url.host_str()?.split('.').next()?;
    label
        .starts_with(PREVIEW_LABEL_PREFIX)
        .then(|| label.to_string())
}
