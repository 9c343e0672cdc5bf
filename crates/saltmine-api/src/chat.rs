use std::convert::Infallible;

use async_stream::stream;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use chrono::Utc;
use futures_util::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use saltmine_providers::adp::{ChatEvent, ChatRequest};
use saltmine_types::api::ChatRelayRequest;

use crate::error::{ApiError, ApiResult};
use crate::pain_points::stream_headers;
use crate::state::AppState;

/// `POST /api/adp/chat`
///
/// Relays the agent's events one to one, each as `event: <type>` with the
/// event JSON as data, and finishes with `done`.
pub async fn relay(
    State(state): State<AppState>,
    Json(req): Json<ChatRelayRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Content is required".into()));
    }

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let visitor_biz_id = req
        .visitor_biz_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("visitor_{}", Utc::now().timestamp_millis()));

    let request = ChatRequest {
        session_id,
        visitor_biz_id,
        content: content.to_string(),
        request_id: None,
    };
    debug!(session_id = %request.session_id, "Relaying chat");

    let mut upstream = state.chat.stream_chat(request);
    let events = stream! {
        while let Some(event) = upstream.next().await {
            let failed = matches!(event, ChatEvent::Error { .. });
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().event(event.kind()).data(data)),
                Err(e) => warn!("Dropping unencodable chat event: {}", e),
            }
            if failed {
                break;
            }
        }
        yield Ok(Event::default().event("done").data("[DONE]"));
    };

    Ok((stream_headers(), Sse::new(events)))
}
