//! Daily search allowance checks for the analysis endpoint.
//!
//! Registered users are metered through their `user_quotas` row. Guests are
//! metered server-side under a random id kept in a signed cookie; the count
//! the browser reports can only make the check stricter.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use saltmine_db::models::{QuotaRow, UserRow};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const GUEST_COOKIE: &str = "saltmine_guest";

/// Today's quota row for `user`, created on first use.
///
/// A membership that lapsed during the day leaves the paid limit on a row
/// created earlier; such a row is lowered to the free limits, keeping usage.
pub fn todays_quota(state: &AppState, user: &UserRow, now: DateTime<Utc>) -> ApiResult<QuotaRow> {
    let tier = user.effective_membership(now);
    let limits = state.quota.limits_for(tier);
    let today = now.date_naive();
    let quota = state.db.get_or_create_quota(&user.id, today, limits)?;

    if !tier.is_paid() && quota.searches_limit > limits.searches {
        info!(user_id = %user.id, limit = limits.searches, "Membership lapsed, lowering today's quota");
        return Ok(state.db.upsert_quota_limits(&user.id, today, limits)?);
    }
    Ok(quota)
}

/// Counts one search for a registered user, or refuses it.
///
/// Paid tiers are always allowed and only counted. Free users are charged
/// with a guarded increment, so two concurrent requests cannot both take
/// the last search.
pub fn charge_user(state: &AppState, user: &UserRow, now: DateTime<Utc>) -> ApiResult<QuotaRow> {
    let tier = user.effective_membership(now);
    let quota = todays_quota(state, user, now)?;

    if tier.is_paid() {
        let quota = state.db.increment_searches(&quota.id)?;
        debug!(user_id = %user.id, used = quota.searches_used, "Counted paid search");
        return Ok(quota);
    }

    match state.db.try_increment_searches(&quota.id)? {
        Some(updated) => {
            debug!(
                user_id = %user.id,
                used = updated.searches_used,
                limit = updated.searches_limit,
                "Counted free search"
            );
            Ok(updated)
        }
        None => {
            info!(user_id = %user.id, limit = quota.searches_limit, "Daily quota exhausted");
            Err(ApiError::QuotaExceeded {
                limit: quota.searches_limit,
            })
        }
    }
}

/// Counts one guest search, or refuses it. Returns the cookie jar to send
/// back; it only carries a `Set-Cookie` when a new guest id was issued.
pub fn charge_guest(
    state: &AppState,
    headers: &HeaderMap,
    reported_count: u32,
    now: DateTime<Utc>,
) -> ApiResult<SignedCookieJar> {
    let jar = SignedCookieJar::from_headers(headers, state.cookie_key.clone());
    let (guest_id, jar) = match jar.get(GUEST_COOKIE) {
        Some(cookie) => (cookie.value().to_string(), jar),
        None => {
            let id = Uuid::new_v4().to_string();
            let cookie = Cookie::build((GUEST_COOKIE, id.clone()))
                .path("/")
                .http_only(true)
                .permanent();
            (id, jar.add(cookie))
        }
    };

    let today = now.date_naive();
    let limit = state.quota.guest_daily_searches;
    let used = state.db.guest_searches(&guest_id, today)?;
    let effective = used.max(i64::from(reported_count));

    if effective >= limit {
        info!(guest_id = %guest_id, used, reported_count, "Guest quota exhausted");
        return Err(ApiError::GuestQuotaExceeded { limit });
    }

    let used = state.db.record_guest_search(&guest_id, today)?;
    debug!(guest_id = %guest_id, used, "Counted guest search");
    Ok(jar)
}
