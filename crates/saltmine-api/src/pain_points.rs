use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, header},
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::Utc;
use futures_util::StreamExt;
use tracing::info;

use saltmine_types::api::AnalyzeRequest;

use crate::analysis;
use crate::auth::current_user;
use crate::error::{ApiError, ApiResult};
use crate::middleware::bearer_claims;
use crate::quota::{charge_guest, charge_user};
use crate::state::AppState;

/// Headers that keep proxies from buffering or transforming an event stream.
pub(crate) fn stream_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-cache, no-transform"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ]
}

/// `POST /api/pain-points/analyze`
///
/// Quota is charged before the stream starts, so a rejected request gets a
/// plain JSON 403 instead of an event stream.
pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<impl IntoResponse> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Query parameter is required".into()));
    }

    let now = Utc::now();
    let jar = match bearer_claims(&headers, &state.jwt_secret)? {
        Some(claims) => {
            let user = current_user(&state, &claims)?;
            charge_user(&state, &user, now)?;
            info!(user_id = %user.id, query = %query, "Starting analysis");
            SignedCookieJar::new(state.cookie_key.clone())
        }
        None => {
            let jar = charge_guest(&state, &headers, req.guest_usage_count, now)?;
            info!(query = %query, "Starting guest analysis");
            jar
        }
    };

    let events = analysis::run(state.clone(), query)
        .map(|event| Ok::<_, Infallible>(Event::default().event(event.name()).data(event.data())));

    Ok((jar, stream_headers(), Sse::new(events)))
}
