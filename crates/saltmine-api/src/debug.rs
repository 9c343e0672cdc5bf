//! Quota inspection endpoints used to diagnose day-boundary problems.

use axum::{Extension, Json, extract::State};
use chrono::Utc;
use tracing::debug;

use saltmine_db::queries::day_key;
use saltmine_types::api::{
    Claims, QuotaDebugInfo, QuotaDebugResponse, QuotaHistoryEntry, QuotaIncrementResponse,
};

use crate::auth::{current_user, user_summary};
use crate::error::ApiResult;
use crate::quota::todays_quota;
use crate::state::AppState;
use crate::user::quota_view;

const HISTORY_LEN: u32 = 10;

/// `GET /api/debug/quota`
pub async fn quota_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<QuotaDebugResponse>> {
    let user = current_user(&state, &claims)?;
    let now = Utc::now();
    let today = now.date_naive();

    let today_quota = state.db.get_quota(&user.id, today)?;
    let history = state
        .db
        .quota_history(&user.id, HISTORY_LEN)?
        .into_iter()
        .map(|row| QuotaHistoryEntry {
            date: row.date,
            used: row.searches_used,
            limit: row.searches_limit,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(QuotaDebugResponse {
        debug: QuotaDebugInfo {
            server_time: now.to_rfc3339(),
            db_time: state.db.db_time()?,
            today_date_utc: day_key(today),
        },
        user: user_summary(&user)?,
        today_quota: today_quota.as_ref().map(quota_view),
        history,
    }))
}

/// `POST /api/debug/quota`
///
/// Counts one search without any limit check.
pub async fn increment_quota(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<QuotaIncrementResponse>> {
    let user = current_user(&state, &claims)?;
    let before = todays_quota(&state, &user, Utc::now())?;
    let after = state.db.increment_searches(&before.id)?;
    debug!(user_id = %user.id, before = before.searches_used, after = after.searches_used, "Debug increment");

    Ok(Json(QuotaIncrementResponse {
        message: "Quota incremented".into(),
        before: before.searches_used,
        after: after.searches_used,
        quota: quota_view(&after),
    }))
}
