use axum::{Extension, Json, extract::State};
use chrono::Utc;
use tracing::info;

use saltmine_db::models::QuotaRow;
use saltmine_types::api::{
    Claims, DashboardResponse, DashboardStats, MessageResponse, QuotaView, RefreshSessionResponse,
    UpdatePasswordRequest, UpdateProfileRequest, UserSummary,
};

use crate::auth::{
    create_token, current_user, hash_password, user_summary, validate_name, validate_password,
    verify_password,
};
use crate::error::{ApiError, ApiResult};
use crate::quota::todays_quota;
use crate::state::AppState;

const CREDENTIALS_PROVIDER: &str = "credentials";

pub fn quota_view(row: &QuotaRow) -> QuotaView {
    QuotaView {
        date: row.date.clone(),
        searches_used: row.searches_used,
        searches_limit: row.searches_limit,
        messages_used: row.messages_used,
        messages_limit: row.messages_limit,
    }
}

/// `GET /api/user/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<DashboardResponse>> {
    let user = current_user(&state, &claims)?;
    let quota = todays_quota(&state, &user, Utc::now())?;
    let total_searches = state.db.total_searches(&user.id)?;

    Ok(Json(DashboardResponse {
        quota: quota_view(&quota),
        stats: DashboardStats {
            total_searches,
            member_since: user.created_at.clone(),
        },
        user: user_summary(&user)?,
    }))
}

/// `GET /api/user/refresh-session`
///
/// Re-issues the token so the claims pick up a tier change after payment.
pub async fn refresh_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<RefreshSessionResponse>> {
    let user = current_user(&state, &claims)?;
    let summary = user_summary(&user)?;
    let token = create_token(&state.jwt_secret, &summary)?;

    Ok(Json(RefreshSessionResponse {
        success: true,
        token,
        user: summary,
    }))
}

/// `PATCH /api/user/update-password`
pub async fn update_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePasswordRequest>,
) -> ApiResult<Json<MessageResponse<UserSummary>>> {
    let user = current_user(&state, &claims)?;
    let stored = match user.password_hash.as_deref() {
        Some(hash) if user.provider == CREDENTIALS_PROVIDER => hash,
        _ => {
            return Err(ApiError::BadRequest(
                "Password changes are only available for email accounts".into(),
            ));
        }
    };

    if !verify_password(&req.current_password, stored)? {
        return Err(ApiError::BadRequest("Current password is incorrect".into()));
    }
    if req.new_password == req.current_password {
        return Err(ApiError::BadRequest(
            "New password must be different from the current password".into(),
        ));
    }
    validate_password(&req.new_password)?;

    let hash = hash_password(&req.new_password)?;
    state.db.update_password(&user.id, &hash)?;
    info!(user_id = %user.id, "Password updated");

    Ok(Json(MessageResponse {
        message: "Password updated successfully".into(),
        user: None,
    }))
}

/// `PATCH /api/user/update-profile`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<MessageResponse<UserSummary>>> {
    let user = current_user(&state, &claims)?;
    let name = validate_name(&req.name)?;

    let updated = state
        .db
        .update_name(&user.id, name)?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(MessageResponse {
        message: "Profile updated successfully".into(),
        user: Some(user_summary(&updated)?),
    }))
}
