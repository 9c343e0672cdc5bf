use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{SearchPost, Tier};

// -- JWT Claims --

/// Session token claims. The tier is a snapshot taken when the token was
/// issued; handlers that gate on membership re-read the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub membership: Tier,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub membership_type: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_expires_at: Option<String>,
}

// -- Pain point analysis --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub query: String,
    /// Informational only; the session decides who the caller is.
    #[serde(default)]
    pub is_guest: bool,
    /// Count the browser believes it has used today. Only ever tightens the
    /// server-side guest check.
    #[serde(default)]
    pub guest_usage_count: u32,
}

// -- Reddit search --

#[derive(Debug, Deserialize)]
pub struct RedditSearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_num")]
    pub num: u32,
    #[serde(default = "default_page")]
    pub page: u32,
    pub tbs: Option<String>,
    pub subreddit: Option<String>,
}

fn default_search_num() -> u32 {
    25
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditSearchResponse {
    pub success: bool,
    pub data: Vec<SearchPost>,
    pub total: u64,
    pub search_time: f64,
    pub query: String,
}

// -- Chat relay --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRelayRequest {
    #[serde(default)]
    pub content: String,
    pub session_id: Option<String>,
    pub visitor_biz_id: Option<String>,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[serde(rename = "orderID")]
    pub order_id: String,
    pub plan_id: String,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureOrderRequest {
    #[serde(rename = "orderID", default)]
    pub order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderResponse {
    pub success: bool,
    pub payment_id: String,
    pub membership_type: Tier,
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- User --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T: Serialize> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct RefreshSessionResponse {
    pub success: bool,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaView {
    pub date: String,
    pub searches_used: i64,
    pub searches_limit: i64,
    pub messages_used: i64,
    pub messages_limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_searches: i64,
    pub member_since: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub quota: QuotaView,
    pub stats: DashboardStats,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDebugInfo {
    pub server_time: String,
    pub db_time: String,
    pub today_date_utc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaHistoryEntry {
    pub date: String,
    pub used: i64,
    pub limit: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDebugResponse {
    pub debug: QuotaDebugInfo,
    pub user: UserSummary,
    pub today_quota: Option<QuotaView>,
    pub history: Vec<QuotaHistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct QuotaIncrementResponse {
    pub message: String,
    pub before: i64,
    pub after: i64,
    pub quota: QuotaView,
}


// -- Contact --

/// Missing fields deserialize as empty so the handler can answer with one
/// "all fields are required" message.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub company: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
}
