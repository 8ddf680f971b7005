/// Entitlement derivation
///
/// A user's persisted `access` holds base bits only. Plan bits are derived
/// from the active subscription every time tokens are issued, so a plan
/// change takes effect on the next issuance without touching the user row.
use std::sync::Arc;

use tracing::warn;

use crate::db::SubscriptionStore;
use crate::error::Result;
use crate::models::{Entitlements, User};

pub const ACCESS_USER: i64 = 1;
pub const ACCESS_ADMIN: i64 = 1 << 1;

pub const PLAN_STARTER: i64 = 1 << 8;
pub const PLAN_PRO: i64 = 1 << 9;
pub const PLAN_AGENCY: i64 = 1 << 10;

/// Every bit a subscription plan may contribute
pub const PLAN_MASK: i64 = PLAN_STARTER | PLAN_PRO | PLAN_AGENCY;

/// Plan identifier -> plan bit
pub fn plan_bit(plan: &str) -> Option<i64> {
    match plan {
        "starter" => Some(PLAN_STARTER),
        "pro" => Some(PLAN_PRO),
        "agency" => Some(PLAN_AGENCY),
        _ => None,
    }
}

#[derive(Clone)]
pub struct AccessPolicy {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl AccessPolicy {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }

    pub async fn derive(&self, user: &User) -> Result<Entitlements> {
        let base = user.access & !PLAN_MASK;

        let Some(subscription) = self.subscriptions.find_active(user.id).await? else {
            return Ok(Entitlements {
                subscription_active: false,
                access: base,
            });
        };

        let access = match plan_bit(&subscription.plan) {
            Some(bit) => base | bit,
            None => {
                warn!(
                    user_id = %user.id,
                    plan = %subscription.plan,
                    "Unknown subscription plan, no plan bit granted"
                );
                base
            }
        };

        Ok(Entitlements {
            subscription_active: true,
            access,
        })
    }
}
