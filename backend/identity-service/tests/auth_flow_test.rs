/// Login and refresh flow tests
///
/// Drives `LoginOrchestrator` end to end against the in-memory store, with
/// mocked OAuth and SMS verification providers.
///
/// Test Coverage:
/// - Login: authorization URL, PKCE, state persistence, provider resolution
/// - Callback: user creation, single-use state, second-factor branching
/// - Phone / Verify: code dispatch and approval
/// - Refresh: access-token short-circuit, rotation, replay, races, revocation
/// - Force refresh and logout
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use identity_service::config::{FlowSettings, JwtSettings};
use identity_service::db::{InMemoryStore, PendingAuthStore};
use identity_service::error::{ErrorKind, IdentityError, Result};
use identity_service::models::{
    OAuthClientConfig, OAuthIdentity, OAuthProvider, PendingAuth, PendingLogin, RefreshStatus,
    RefreshToken, Subscription, User,
};
use identity_service::security::{pkce, TokenIssuer};
use identity_service::services::access::{ACCESS_USER, PLAN_PRO};
use identity_service::services::oauth::EmailProvider;
use identity_service::services::{
    AccessPolicy, LoginOrchestrator, OAuthClient, ProviderRegistry, TwoFactorGate,
    VerificationProvider, VerificationStatus,
};
use mockall::mock;
use url::Url;
use uuid::Uuid;

// ============================================
// Mocks
// ============================================

mock! {
    pub Provider {}

    #[async_trait]
    impl OAuthClient for Provider {
        fn provider(&self) -> OAuthProvider;
        fn client_config(&self) -> &OAuthClientConfig;
        async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String>;
        async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity>;
    }
}

mock! {
    pub Verifier {}

    #[async_trait]
    impl VerificationProvider for Verifier {
        async fn send_code(&self, to: &str) -> Result<()>;
        async fn check_code(&self, to: &str, code: &str) -> Result<VerificationStatus>;
    }
}

/// Provider whose token exchange never finishes in time
struct StalledProvider {
    config: OAuthClientConfig,
}

#[async_trait]
impl OAuthClient for StalledProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Github
    }

    fn client_config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<String> {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        Ok("late".to_string())
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<OAuthIdentity> {
        Ok(identity())
    }
}

/// Pending store whose next insert fails, as on a dropped connection
struct FlakyPendingStore {
    inner: Arc<InMemoryStore>,
    fail_next_insert: AtomicBool,
}

#[async_trait]
impl PendingAuthStore for FlakyPendingStore {
    async fn insert(&self, record: &PendingAuth) -> Result<()> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(IdentityError::Database("connection reset".to_string()));
        }
        self.inner.insert(record).await
    }

    async fn find(&self, id: &str) -> Result<Option<PendingAuth>> {
        self.inner.find(id).await
    }

    async fn consume_login(&self, state: &str, now: DateTime<Utc>) -> Result<bool> {
        self.inner.consume_login(state, now).await
    }

    async fn rotate_refresh(
        &self,
        id: &str,
        now: DateTime<Utc>,
        grace_until: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.rotate_refresh(id, now, grace_until).await
    }

    async fn revoke_refresh(&self, id: &str) -> Result<bool> {
        self.inner.revoke_refresh(id).await
    }
}

// ============================================
// Test Helpers
// ============================================

struct Harness {
    orchestrator: LoginOrchestrator,
    store: Arc<InMemoryStore>,
    issuer: Arc<TokenIssuer>,
}

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        signing_key: "integration-test-secret".to_string(),
        validation_key: None,
        algorithm: "HS256".to_string(),
        issuer: "identity-service".to_string(),
        access_ttl_seconds: 900,
        refresh_ttl_seconds: 2_592_000,
        session_ttl_seconds: 600,
    }
}

fn github_config() -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: "gh-client".to_string(),
        client_secret: "gh-secret".to_string(),
        auth_url: "https://github.com/login/oauth/authorize".to_string(),
        token_url: "https://github.com/login/oauth/access_token".to_string(),
        redirect_uri: "https://app.example.com/auth/callback".to_string(),
        scopes: vec!["read:user".to_string(), "user:email".to_string()],
    }
}

fn identity() -> OAuthIdentity {
    OAuthIdentity {
        email: "ada@example.com".to_string(),
        subject: "42".to_string(),
        avatar_url: "https://avatars.example.com/42.png".to_string(),
    }
}

/// GitHub mock that accepts any code and returns `identity`.
fn github(identity: OAuthIdentity) -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_provider().return_const(OAuthProvider::Github);
    provider.expect_client_config().return_const(github_config());
    provider
        .expect_exchange_code()
        .returning(|_, _| Ok("provider-access-token".to_string()));
    provider
        .expect_fetch_identity()
        .returning(move |_| Ok(identity.clone()));
    provider
}

fn harness(verifier: Option<MockVerifier>) -> Harness {
    harness_with(Arc::new(github(identity())), verifier, FlowSettings::default())
}

fn harness_with(
    client: Arc<dyn OAuthClient>,
    verifier: Option<MockVerifier>,
    flow: FlowSettings,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let issuer = Arc::new(TokenIssuer::from_settings(&jwt_settings()).unwrap());
    let registry = ProviderRegistry::new()
        .with(client)
        .with(Arc::new(EmailProvider::new()));
    let verifier = verifier.map(|v| Arc::new(v) as Arc<dyn VerificationProvider>);
    let gate = TwoFactorGate::new(verifier, store.clone(), issuer.clone());

    let orchestrator = LoginOrchestrator::new(
        registry,
        store.clone(),
        store.clone(),
        AccessPolicy::new(store.clone()),
        issuer.clone(),
        gate,
        flow,
    );

    Harness {
        orchestrator,
        store,
        issuer,
    }
}

/// Harness whose pending store can be made to fail its next insert.
fn flaky_harness() -> (Harness, Arc<FlakyPendingStore>) {
    let store = Arc::new(InMemoryStore::new());
    let pending = Arc::new(FlakyPendingStore {
        inner: store.clone(),
        fail_next_insert: AtomicBool::new(false),
    });
    let issuer = Arc::new(TokenIssuer::from_settings(&jwt_settings()).unwrap());
    let registry = ProviderRegistry::new().with(Arc::new(github(identity())));
    let gate = TwoFactorGate::new(None, store.clone(), issuer.clone());

    let orchestrator = LoginOrchestrator::new(
        registry,
        pending.clone(),
        store.clone(),
        AccessPolicy::new(store.clone()),
        issuer.clone(),
        gate,
        FlowSettings::default(),
    );

    let harness = Harness {
        orchestrator,
        store,
        issuer,
    };
    (harness, pending)
}

fn seed_user(store: &InMemoryStore, phone: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        email: "ada@example.com".to_string(),
        sub: "github:42".to_string(),
        avatar: "https://avatars.example.com/42.png".to_string(),
        phone: phone.to_string(),
        access: ACCESS_USER,
        api_key: "api-key".to_string(),
        last_active_at: None,
        created_at: Utc::now(),
    };
    store.put_user(user.clone());
    user
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

async fn start_login(h: &Harness) -> String {
    let response = h.orchestrator.login("/dashboard", "github").await.unwrap();
    query(&response.url)["state"].clone()
}

fn refresh_row(store: &InMemoryStore, refresh_token: &str, issuer: &TokenIssuer) -> RefreshToken {
    let jti = issuer
        .validate_refresh_allow_expired(refresh_token)
        .unwrap()
        .jti;
    match store.pending(&jti) {
        Some(PendingAuth::Refresh(row)) => row,
        other => panic!("expected refresh row, got {other:?}"),
    }
}

// ============================================
// Login
// ============================================

#[tokio::test]
async fn test_login_returns_authorization_url_with_pkce() {
    let h = harness(None);

    let response = h.orchestrator.login("/dashboard", "github").await.unwrap();
    let params = query(&response.url);

    assert!(response.url.starts_with("https://github.com/login/oauth/authorize?"));
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["access_type"], "offline");
    assert_eq!(params["client_id"], "gh-client");

    // Persisted attempt matches the URL
    let state = &params["state"];
    match h.store.pending(state) {
        Some(PendingAuth::Login(login)) => {
            assert_eq!(login.provider, OAuthProvider::Github);
            assert_eq!(login.return_url, "/dashboard");
            assert_eq!(
                pkce::generate_code_challenge(&login.verifier).unwrap(),
                params["code_challenge"]
            );
            assert!(login.expires > Utc::now());
        }
        other => panic!("expected login record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_states_are_unique() {
    let h = harness(None);

    let first = start_login(&h).await;
    let second = start_login(&h).await;

    assert_ne!(first, second);
}

#[tokio::test]
async fn test_preview_deployment_prefixes_state() {
    let flow = FlowSettings {
        base_url: "https://pr-42.app.example.com".to_string(),
        ..FlowSettings::default()
    };
    let h = harness_with(Arc::new(github(identity())), None, flow);

    let state = start_login(&h).await;

    assert!(state.starts_with("pr-42."), "state was {state}");
}

#[tokio::test]
async fn test_login_rejects_unknown_and_unconfigured_providers() {
    let h = harness(None);

    let err = h.orchestrator.login("/", "myspace").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h.orchestrator.login("/", "google").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // Email pass-through has no authorization endpoint
    let err = h.orchestrator.login("/", "email").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

// ============================================
// Callback
// ============================================

#[tokio::test]
async fn test_callback_without_two_factor_issues_tokens() {
    let h = harness(None);
    let state = start_login(&h).await;

    let response = h.orchestrator.callback(&state, "auth-code").await.unwrap();

    assert!(response.fresh);
    assert!(response.session_token.is_none());
    assert_eq!(response.return_url, "/dashboard");
    assert!(!response.has_phone);

    let access = h
        .issuer
        .validate_access(response.access_token.as_deref().unwrap())
        .unwrap();
    assert_eq!(access.email, "ada@example.com");
    assert_eq!(access.access, ACCESS_USER);
    assert!(!access.subscribed);

    let user = h.store.user(access.sub).unwrap();
    assert_eq!(user.sub, "github:42");
    assert_eq!(user.avatar, "https://avatars.example.com/42.png");
    assert_eq!(response.user.unwrap().id, user.id);

    let row = refresh_row(&h.store, response.refresh_token.as_deref().unwrap(), &h.issuer);
    assert_eq!(row.user_id, Some(user.id));
    assert_eq!(row.status(Utc::now()), RefreshStatus::Issued);
}

#[tokio::test]
async fn test_callback_passes_verifier_to_provider() {
    let mut provider = MockProvider::new();
    provider.expect_provider().return_const(OAuthProvider::Github);
    provider.expect_client_config().return_const(github_config());
    provider
        .expect_exchange_code()
        .withf(|code: &str, verifier: &str| {
            code == "auth-code" && pkce::is_valid_code_verifier(verifier)
        })
        .times(1)
        .returning(|_, _| Ok("provider-access-token".to_string()));
    provider
        .expect_fetch_identity()
        .withf(|token: &str| token == "provider-access-token")
        .times(1)
        .returning(|_| Ok(identity()));
    let h = harness_with(Arc::new(provider), None, FlowSettings::default());

    let state = start_login(&h).await;
    h.orchestrator.callback(&state, "auth-code").await.unwrap();
}

#[tokio::test]
async fn test_returning_user_is_not_duplicated() {
    let h = harness(None);

    let state = start_login(&h).await;
    h.orchestrator.callback(&state, "code-1").await.unwrap();
    let state = start_login(&h).await;
    h.orchestrator.callback(&state, "code-2").await.unwrap();

    assert_eq!(h.store.user_count(), 1);
}

#[tokio::test]
async fn test_callback_returns_existing_user_row() {
    let h = harness(None);
    let mut existing = seed_user(&h.store, "");
    existing.avatar = "https://cdn.example.com/stored-avatar.png".to_string();
    h.store.put_user(existing.clone());
    let state = start_login(&h).await;

    let response = h.orchestrator.callback(&state, "auth-code").await.unwrap();

    let user = response.user.unwrap();
    assert_eq!(user.id, existing.id);
    assert_eq!(user.email, existing.email);
    assert_eq!(user.avatar, existing.avatar);
    assert_eq!(h.store.user_count(), 1);
}

#[tokio::test]
async fn test_callback_state_is_single_use() {
    let h = harness(None);
    let state = start_login(&h).await;

    h.orchestrator.callback(&state, "auth-code").await.unwrap();
    let err = h.orchestrator.callback(&state, "auth-code").await.unwrap_err();

    assert!(matches!(err, IdentityError::LoginExpired));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_callback_unknown_state_not_found() {
    let h = harness(None);

    let err = h.orchestrator.callback("forged", "auth-code").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_callback_expired_state_rejected() {
    let h = harness(None);
    h.store.put_pending(PendingAuth::Login(PendingLogin {
        state: "stale".to_string(),
        provider: OAuthProvider::Github,
        verifier: "v".repeat(43),
        return_url: "/".to_string(),
        expires: Utc::now() - Duration::minutes(1),
    }));

    let err = h.orchestrator.callback("stale", "auth-code").await.unwrap_err();

    assert!(matches!(err, IdentityError::LoginExpired));
}

#[tokio::test]
async fn test_callback_refresh_row_is_not_a_login() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();
    let row = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);

    let err = h.orchestrator.callback(&row.id, "auth-code").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_callback_empty_identity_unauthorized() {
    let h = harness_with(
        Arc::new(github(OAuthIdentity::default())),
        None,
        FlowSettings::default(),
    );
    let state = start_login(&h).await;

    let err = h.orchestrator.callback(&state, "auth-code").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.store.user_count(), 0);
}

#[tokio::test]
async fn test_callback_provider_failure_unauthorized() {
    let mut provider = MockProvider::new();
    provider.expect_provider().return_const(OAuthProvider::Github);
    provider.expect_client_config().return_const(github_config());
    provider
        .expect_exchange_code()
        .returning(|_, _| Err(IdentityError::OAuthError("bad_verification_code".to_string())));
    let h = harness_with(Arc::new(provider), None, FlowSettings::default());
    let state = start_login(&h).await;

    let err = h.orchestrator.callback(&state, "auth-code").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_callback_times_out() {
    let flow = FlowSettings {
        context_timeout_seconds: 1,
        ..FlowSettings::default()
    };
    let h = harness_with(
        Arc::new(StalledProvider {
            config: github_config(),
        }),
        None,
        flow,
    );
    let state = start_login(&h).await;

    let err = h.orchestrator.callback(&state, "auth-code").await.unwrap_err();

    assert!(matches!(err, IdentityError::Timeout(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

// ============================================
// Second factor
// ============================================

#[tokio::test]
async fn test_two_factor_without_phone_returns_enrolment_session() {
    let mut verifier = MockVerifier::new();
    verifier.expect_send_code().times(0);
    let h = harness(Some(verifier));
    let state = start_login(&h).await;

    let response = h.orchestrator.callback(&state, "auth-code").await.unwrap();

    assert!(response.access_token.is_none());
    assert!(response.refresh_token.is_none());
    assert!(!response.has_phone);
    let session = h
        .issuer
        .validate_session(response.session_token.as_deref().unwrap())
        .unwrap();
    assert_eq!(session.phone, "");
}

#[tokio::test]
async fn test_two_factor_with_phone_sends_code() {
    let mut verifier = MockVerifier::new();
    verifier
        .expect_send_code()
        .withf(|to: &str| to == "+15550001111")
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(Some(verifier));
    seed_user(&h.store, "+15550001111");
    let state = start_login(&h).await;

    let response = h.orchestrator.callback(&state, "auth-code").await.unwrap();

    assert!(response.has_phone);
    assert!(response.access_token.is_none());
    let session = h
        .issuer
        .validate_session(response.session_token.as_deref().unwrap())
        .unwrap();
    assert_eq!(session.phone, "+15550001111");
}

#[tokio::test]
async fn test_phone_enrolment_then_verify() {
    let mut verifier = MockVerifier::new();
    verifier.expect_send_code().times(1).returning(|_| Ok(()));
    verifier
        .expect_check_code()
        .withf(|to: &str, code: &str| to == "+15550002222" && code == "123456")
        .times(1)
        .returning(|_, _| Ok(VerificationStatus::Approved));
    let h = harness(Some(verifier));
    let user = seed_user(&h.store, "");

    // GIVEN a user without a phone
    let phone = h.orchestrator.phone(user.id, "+15550002222").await.unwrap();
    let session = h.issuer.validate_session(&phone.session_token).unwrap();
    assert_eq!(session.sub, user.id);

    // WHEN the code is approved
    let tokens = h
        .orchestrator
        .verify(user.id, "+15550002222", " 123456 ")
        .await
        .unwrap();

    // THEN tokens are issued and the phone is stored
    assert!(tokens.fresh);
    assert_eq!(tokens.user.id, user.id);
    assert_eq!(h.store.user(user.id).unwrap().phone, "+15550002222");
}

#[tokio::test]
async fn test_verify_pending_code_rejected() {
    let mut verifier = MockVerifier::new();
    verifier
        .expect_check_code()
        .returning(|_, _| Ok(VerificationStatus::Pending));
    let h = harness(Some(verifier));
    let user = seed_user(&h.store, "");

    let err = h
        .orchestrator
        .verify(user.id, "+15550002222", "000000")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Invalid code");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.store.user(user.id).unwrap().phone, "");
}

#[tokio::test]
async fn test_phone_without_gate_is_bad_request() {
    let h = harness(None);
    let user = seed_user(&h.store, "");

    let err = h.orchestrator.phone(user.id, "+15550002222").await.unwrap_err();

    assert!(matches!(err, IdentityError::TwoFANotEnabled));
}

// ============================================
// Refresh
// ============================================

#[tokio::test]
async fn test_refresh_with_valid_access_token_is_a_no_op() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    let refreshed = h
        .orchestrator
        .refresh(&tokens.access_token, &tokens.refresh_token)
        .await
        .unwrap();

    assert!(!refreshed.fresh);
    assert_eq!(refreshed.access_token, tokens.access_token);
    assert_eq!(refreshed.refresh_token, tokens.refresh_token);
    assert_eq!(refreshed.user.id, user.id);
    let row = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    assert_eq!(row.status(Utc::now()), RefreshStatus::Issued);
}

#[tokio::test]
async fn test_valid_access_token_ignores_unusable_refresh_token() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    // Garbage refresh token
    let refreshed = h
        .orchestrator
        .refresh(&tokens.access_token, "not-a-jwt")
        .await
        .unwrap();
    assert!(!refreshed.fresh);
    assert_eq!(refreshed.access_token, tokens.access_token);
    assert_eq!(refreshed.refresh_token, "not-a-jwt");

    // Revoked refresh token
    h.orchestrator.logout(&tokens.refresh_token).await.unwrap();
    let before = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);

    let refreshed = h
        .orchestrator
        .refresh(&tokens.access_token, &tokens.refresh_token)
        .await
        .unwrap();

    assert!(!refreshed.fresh);
    assert_eq!(refreshed.user.id, user.id);
    let after = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    assert_eq!(after, before);
    assert_eq!(after.status(Utc::now()), RefreshStatus::Revoked);
}

#[tokio::test]
async fn test_failed_rotation_keeps_refresh_token_usable() {
    let (h, pending) = flaky_harness();
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    // GIVEN the replacement row cannot be stored
    pending.fail_next_insert.store(true, Ordering::SeqCst);

    // WHEN the refresh fails
    let err = h
        .orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    // THEN the presented token is untouched and a retry succeeds
    let old = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    assert_eq!(old.status(Utc::now()), RefreshStatus::Issued);

    let rotated = h
        .orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap();
    assert!(rotated.fresh);
    let new = refresh_row(&h.store, &rotated.refresh_token, &h.issuer);
    assert_eq!(new.rotated_from.as_deref(), Some(old.id.as_str()));
}

#[tokio::test]
async fn test_refresh_rotates_single_use_token() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();
    let expired_access = h
        .issuer
        .issue_access(&user, tokens.entitlements, Utc::now() - Duration::hours(1))
        .unwrap();

    let rotated = h
        .orchestrator
        .refresh(&expired_access, &tokens.refresh_token)
        .await
        .unwrap();

    assert!(rotated.fresh);
    assert_ne!(rotated.refresh_token, tokens.refresh_token);
    h.issuer.validate_access(&rotated.access_token).unwrap();

    let old = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    assert_eq!(old.status(Utc::now()), RefreshStatus::Rotated);
    assert!(old.expires <= Utc::now() + Duration::seconds(60));

    let new = refresh_row(&h.store, &rotated.refresh_token, &h.issuer);
    assert_eq!(new.rotated_from.as_deref(), Some(old.id.as_str()));
    assert_eq!(new.status(Utc::now()), RefreshStatus::Issued);
}

#[tokio::test]
async fn test_refresh_replay_rejected() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    h.orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap();
    let err = h
        .orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::TokenAlreadyRotated));
    assert!(err.to_string().contains("already rotated"));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_concurrent_refresh_has_single_winner() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();
    let orchestrator = Arc::new(h.orchestrator);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&orchestrator);
        let refresh_token = tokens.refresh_token.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.refresh("expired", &refresh_token).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, IdentityError::TokenAlreadyRotated)),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_refresh_expired_row_rejected() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    // Row lapses server-side while the JWT is still within its lifetime
    let mut row = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    row.expires = Utc::now() - Duration::seconds(1);
    h.store.put_pending(PendingAuth::Refresh(row));

    let err = h
        .orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::TokenExpired));
    assert!(err.to_string().contains("expired"));
}

#[tokio::test]
async fn test_refresh_garbage_token_unauthorized() {
    let h = harness(None);

    let err = h
        .orchestrator
        .refresh("garbage", "also-garbage")
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::InvalidToken));
}

#[tokio::test]
async fn test_refresh_records_last_activity() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    h.orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap();

    // Recorded by a detached task
    let mut recorded = false;
    for _ in 0..50 {
        if h.store.user(user.id).unwrap().last_active_at.is_some() {
            recorded = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(recorded);
}

// ============================================
// Force refresh / logout
// ============================================

#[tokio::test]
async fn test_force_refresh_picks_up_new_plan() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let before = h.orchestrator.force_refresh(user.id).await.unwrap();
    assert!(!before.entitlements.subscription_active);

    h.store.put_subscription(Subscription {
        user_id: user.id,
        plan: "pro".to_string(),
        status: "active".to_string(),
        current_period_end: Utc::now() + Duration::days(30),
    });
    let after = h.orchestrator.force_refresh(user.id).await.unwrap();

    assert!(after.entitlements.subscription_active);
    assert_eq!(after.entitlements.access, ACCESS_USER | PLAN_PRO);
    let claims = h.issuer.validate_access(&after.access_token).unwrap();
    assert_eq!(claims.access, ACCESS_USER | PLAN_PRO);
    assert!(claims.subscribed);
    // Base bits on the user row are untouched
    assert_eq!(h.store.user(user.id).unwrap().access, ACCESS_USER);
}

#[tokio::test]
async fn test_force_refresh_unknown_user_not_found() {
    let h = harness(None);

    let err = h.orchestrator.force_refresh(Uuid::new_v4()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();

    h.orchestrator.logout(&tokens.refresh_token).await.unwrap();
    let err = h
        .orchestrator
        .refresh("expired", &tokens.refresh_token)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::TokenRevoked));
    assert!(err.to_string().contains("revoked"));
}

#[tokio::test]
async fn test_logout_unknown_row_not_found() {
    let h = harness(None);
    let row = RefreshToken::issue(
        "never-stored".to_string(),
        Uuid::new_v4(),
        Utc::now() + Duration::days(1),
        None,
    );
    let token = h.issuer.issue_refresh(&row, Utc::now()).unwrap();

    let err = h.orchestrator.logout(&token).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_revoked_row_survives_in_store() {
    let h = harness(None);
    let user = seed_user(&h.store, "");
    let tokens = h.orchestrator.force_refresh(user.id).await.unwrap();
    let jti = h.issuer.validate_refresh(&tokens.refresh_token).unwrap().jti;

    assert!(h.store.revoke_refresh(&jti).await.unwrap());

    let row = refresh_row(&h.store, &tokens.refresh_token, &h.issuer);
    assert_eq!(row.user_id, None);
    assert_eq!(row.status(Utc::now()), RefreshStatus::Revoked);
}
