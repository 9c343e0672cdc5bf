use axum::{Json, extract::State};
use tracing::info;

use saltmine_providers::serper::SearchParams;
use saltmine_types::api::{RedditSearchRequest, RedditSearchResponse};
use saltmine_types::models::Platform;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_RESULTS: u32 = 25;

/// `POST /api/reddit/search`
pub async fn reddit_search(
    State(state): State<AppState>,
    Json(req): Json<RedditSearchRequest>,
) -> ApiResult<Json<RedditSearchResponse>> {
    let num = req.num.clamp(1, MAX_RESULTS);
    let query = req.query.trim();
    let subreddit = req
        .subreddit
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let result = match subreddit {
        Some(sub) => {
            let q = Some(query).filter(|q| !q.is_empty());
            state.search.search_subreddit(sub, q, num, req.tbs).await?
        }
        None => {
            if query.is_empty() {
                return Err(ApiError::BadRequest("Query parameter is required".into()));
            }
            let params = SearchParams::new(query)
                .num(num)
                .page(req.page)
                .tbs(req.tbs);
            state.search.search(Platform::Reddit, &params).await?
        }
    };

    info!(
        query = %result.query,
        posts = result.posts.len(),
        "Reddit search served"
    );

    Ok(Json(RedditSearchResponse {
        success: true,
        data: result.posts,
        total: result.total,
        search_time: result.search_time,
        query: result.query,
    }))
}
