//! Database row types. These map directly to SQLite rows.
//! Distinct from saltmine-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use saltmine_types::models::Tier;

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: String,
    pub membership_type: String,
    pub membership_expires_at: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    /// Stored tier, falling back to FREE when the column holds junk.
    pub fn membership(&self) -> Tier {
        self.membership_type.parse().unwrap_or_default()
    }

    /// Tier in force at `now`: a paid tier whose expiry has passed counts as FREE.
    pub fn effective_membership(&self, now: DateTime<Utc>) -> Tier {
        let tier = self.membership();
        let expired = self
            .membership_expires_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .is_some_and(|at| at.with_timezone(&Utc) <= now);
        if tier.is_paid() && expired { Tier::Free } else { tier }
    }
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone)]
pub struct QuotaRow {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub searches_used: i64,
    pub searches_limit: i64,
    pub messages_used: i64,
    pub messages_limit: i64,
    pub created_at: String,
}

impl QuotaRow {
    pub fn has_searches_left(&self) -> bool {
        self.searches_used < self.searches_limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Created,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

pub struct PaymentRow {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_order_id: String,
    pub provider_payment_id: Option<String>,
    pub amount: String,
    pub currency: String,
    pub plan_id: String,
    pub status: String,
    pub metadata: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl PaymentRow {
    pub fn is_completed(&self) -> bool {
        PaymentStatus::parse(&self.status) == Some(PaymentStatus::Completed)
    }
}

pub struct NewPayment<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub provider: &'a str,
    pub provider_order_id: &'a str,
    pub amount: &'a str,
    pub currency: &'a str,
    pub plan_id: &'a str,
}

/// Everything a successful capture writes, applied in one transaction.
pub struct CompletedCapture<'a> {
    pub payment_id: &'a str,
    pub user_id: &'a str,
    pub provider: &'a str,
    pub provider_order_id: &'a str,
    pub provider_payment_id: &'a str,
    pub amount: &'a str,
    pub currency: &'a str,
    pub plan_id: &'a str,
    pub metadata: &'a str,
    pub membership: Tier,
    pub membership_expires_at: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(tier: &str, expires: Option<String>) -> UserRow {
        UserRow {
            id: "u".into(),
            name: "n".into(),
            email: "e@example.com".into(),
            password_hash: None,
            provider: "credentials".into(),
            membership_type: tier.into(),
            membership_expires_at: expires,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn expired_paid_membership_counts_as_free() {
        let now = Utc::now();
        let past = (now - Duration::days(1)).to_rfc3339();
        let future = (now + Duration::days(1)).to_rfc3339();

        assert_eq!(user("PREMIUM", Some(past)).effective_membership(now), Tier::Free);
        assert_eq!(user("PREMIUM", Some(future)).effective_membership(now), Tier::Premium);
        assert_eq!(user("ENTERPRISE", None).effective_membership(now), Tier::Enterprise);
        assert_eq!(user("garbage", None).effective_membership(now), Tier::Free);
    }
}
