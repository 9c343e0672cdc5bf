use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use saltmine_db::Database;
use saltmine_providers::adp::ChatProvider;
use saltmine_providers::mail::Mailer;
use saltmine_providers::paypal::PaymentProvider;
use saltmine_providers::serper::SearchProvider;
use saltmine_types::models::{QuotaLimits, Tier};

use crate::keywords::KeywordExtractor;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Signs the anonymous guest cookie.
    pub cookie_key: Key,
    pub quota: QuotaPolicy,
    pub search: Arc<dyn SearchProvider>,
    pub chat: Arc<dyn ChatProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub mailer: Arc<dyn Mailer>,
    /// Where contact form messages go. Unset means they are only logged.
    pub contact_to: Option<String>,
    pub keywords: KeywordExtractor,
}

impl AppStateInner {
    /// Derives the 64-byte cookie signing key from the JWT secret.
    pub fn cookie_key_for(jwt_secret: &str) -> Key {
        Key::from(Sha512::digest(jwt_secret.as_bytes()).as_slice())
    }
}

/// Daily search allowances.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub guest_daily_searches: i64,
    pub free: QuotaLimits,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            guest_daily_searches: 3,
            free: QuotaLimits {
                searches: 3,
                messages: 10,
            },
        }
    }
}

impl QuotaPolicy {
    pub fn limits_for(&self, tier: Tier) -> QuotaLimits {
        if tier.is_paid() { QuotaLimits::unlimited() } else { self.free }
    }
}
