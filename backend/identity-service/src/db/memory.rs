//! In-process store for tests and local development.
//!
//! Conditional transitions run under the map's per-key write lock
//! (`DashMap::get_mut`), which gives the same single-winner guarantee as the
//! conditional `UPDATE`s in the PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{PendingAuthStore, SubscriptionStore, UserStore};
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, PendingAuth, Subscription, User};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    pending: DashMap<String, PendingAuth>,
    users: DashMap<Uuid, User>,
    subscriptions: DashMap<Uuid, Subscription>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a user.
    pub fn put_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Seed or replace the subscription for `subscription.user_id`.
    pub fn put_subscription(&self, subscription: Subscription) {
        self.subscriptions.insert(subscription.user_id, subscription);
    }

    pub fn pending(&self, id: &str) -> Option<PendingAuth> {
        self.pending.get(id).map(|p| p.value().clone())
    }

    /// Overwrite a pending record as-is, bypassing transition rules.
    pub fn put_pending(&self, record: PendingAuth) {
        self.pending.insert(record.id().to_string(), record);
    }
}

#[async_trait]
impl PendingAuthStore for InMemoryStore {
    async fn insert(&self, record: &PendingAuth) -> Result<()> {
        match self.pending.entry(record.id().to_string()) {
            Entry::Occupied(entry) => Err(IdentityError::Database(format!(
                "duplicate pending_auth id: {}",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, id: &str) -> Result<Option<PendingAuth>> {
        Ok(self.pending(id))
    }

    async fn consume_login(&self, state: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(mut entry) = self.pending.get_mut(state) else {
            return Ok(false);
        };

        match entry.value_mut() {
            PendingAuth::Login(login) if login.expires > now => {
                login.expires = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate_refresh(
        &self,
        id: &str,
        now: DateTime<Utc>,
        grace_until: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut entry) = self.pending.get_mut(id) else {
            return Ok(false);
        };

        match entry.value_mut() {
            PendingAuth::Refresh(token)
                if token.user_id.is_some() && token.rotated_at.is_none() && token.expires >= now =>
            {
                token.rotated_at = Some(now);
                token.expires = token.expires.min(grace_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_refresh(&self, id: &str) -> Result<bool> {
        let Some(mut entry) = self.pending.get_mut(id) else {
            return Ok(false);
        };

        match entry.value_mut() {
            PendingAuth::Refresh(token) => {
                token.user_id = None;
                Ok(true)
            }
            PendingAuth::Login(_) => Ok(false),
        }
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.user(id))
    }

    async fn find_by_identity(&self, email: &str, sub: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email && u.sub == sub)
            .map(|u| u.value().clone()))
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            sub: new_user.sub,
            avatar: new_user.avatar,
            phone: String::new(),
            access: new_user.access,
            api_key: new_user.api_key,
            last_active_at: None,
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_phone(&self, id: Uuid, phone: &str) -> Result<()> {
        let mut user = self.users.get_mut(&id).ok_or(IdentityError::UserNotFound)?;
        user.phone = phone.to_string();
        Ok(())
    }

    async fn touch_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_active_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .get(&user_id)
            .filter(|s| s.is_active())
            .map(|s| s.value().clone()))
    }
}
