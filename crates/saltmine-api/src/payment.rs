//! PayPal checkout: order creation and the idempotent capture that upgrades
//! the account.

use axum::{Extension, Json, extract::State};
use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use saltmine_db::models::{CompletedCapture, NewPayment, PaymentRow, UserRow};
use saltmine_providers::paypal::OrderRequest;
use saltmine_types::api::{
    CaptureOrderRequest, CaptureOrderResponse, Claims, CreateOrderRequest, CreateOrderResponse,
};
use saltmine_types::plans::plan_by_id;

use crate::auth::current_user;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const PROVIDER: &str = "PAYPAL";

/// `POST /api/payment/create-order`
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Json<CreateOrderResponse>> {
    let user = current_user(&state, &claims)?;
    let plan = plan_by_id(req.plan_id.trim())
        .ok_or_else(|| ApiError::BadRequest("Invalid plan selected".into()))?;
    if !plan.membership.is_paid() {
        return Err(ApiError::BadRequest("The free plan cannot be purchased".into()));
    }

    let amount = plan.amount_value();
    let description = format!("SaltMine {}", plan.name);
    let order = state
        .payments
        .create_order(&OrderRequest {
            amount: &amount,
            currency: plan.currency,
            reference_id: plan.id,
            custom_id: &user.id,
            description: &description,
        })
        .await?;

    state.db.insert_payment(&NewPayment {
        id: &Uuid::new_v4().to_string(),
        user_id: &user.id,
        provider: PROVIDER,
        provider_order_id: &order.id,
        amount: &amount,
        currency: plan.currency,
        plan_id: plan.id,
    })?;
    info!(user_id = %user.id, order_id = %order.id, plan = plan.id, "PayPal order created");

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        plan_id: plan.id.to_string(),
        amount,
        currency: plan.currency.to_string(),
    }))
}

/// `POST /api/payment/capture-order`
///
/// Capturing an order that is already COMPLETED returns the stored outcome
/// without contacting PayPal again.
pub async fn capture_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CaptureOrderRequest>,
) -> ApiResult<Json<CaptureOrderResponse>> {
    let order_id = req.order_id.trim();
    if order_id.is_empty() {
        return Err(ApiError::BadRequest("Order ID is required".into()));
    }
    let user = current_user(&state, &claims)?;

    match state.db.get_payment_by_order(order_id)? {
        Some(row) if row.user_id != user.id => return Err(not_owner(&user, order_id)),
        Some(row) if row.is_completed() => {
            info!(order_id, "Order already captured");
            return Ok(Json(already_captured(&row, &user)));
        }
        Some(_) => {}
        None => {
            // No local record; the order must name this account before any money moves
            let order = state.payments.get_order(order_id).await?;
            if order.custom_id.as_deref() != Some(user.id.as_str()) {
                return Err(not_owner(&user, order_id));
            }
        }
    }

    match finish_capture(&state, &user, order_id).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            // A concurrent capture of the same order may have won the race
            if let Some(row) = state.db.get_payment_by_order(order_id)?.filter(PaymentRow::is_completed) {
                let user = current_user(&state, &claims)?;
                return Ok(Json(already_captured(&row, &user)));
            }

            if !matches!(err, ApiError::Forbidden(_)) {
                if let Err(e) = state.db.record_failed_payment(&user.id, order_id, &err.to_string()) {
                    error!(order_id, "Failed to record payment failure: {:#}", e);
                }
            }
            if err.status_code().is_client_error() {
                Err(err)
            } else {
                Err(ApiError::Internal(anyhow::Error::new(err).context("Payment capture failed")))
            }
        }
    }
}

async fn finish_capture(state: &AppState, user: &UserRow, order_id: &str) -> ApiResult<CaptureOrderResponse> {
    let captured = state.payments.capture_order(order_id).await?;
    if !captured.is_completed() {
        return Err(ApiError::BadRequest(format!(
            "Payment not completed (status {})",
            captured.status
        )));
    }
    let details = captured
        .capture
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Capture details missing".into()))?;
    if captured.custom_id.as_deref().is_some_and(|owner| owner != user.id) {
        return Err(not_owner(user, order_id));
    }

    // A row left by an earlier failed attempt carries no plan; fall back to PayPal's copy
    let recorded = state.db.get_payment_by_order(order_id)?;
    let plan = recorded
        .as_ref()
        .and_then(|row| plan_by_id(&row.plan_id))
        .or_else(|| captured.reference_id.as_deref().and_then(plan_by_id))
        .filter(|p| p.membership.is_paid())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown plan: {}",
                captured.reference_id.as_deref().unwrap_or_default()
            ))
        })?;
    if details.amount != plan.amount_value() {
        warn!(
            order_id,
            captured = %details.amount,
            expected = %plan.amount_value(),
            "Captured amount differs from plan price"
        );
    }

    let now = Utc::now();
    let expires_at = (now + Duration::days(plan.duration_days)).to_rfc3339();
    let payment_id = recorded
        .as_ref()
        .map(|row| row.id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let metadata = captured.raw.to_string();

    let (payment, updated) = state.db.complete_capture(
        &CompletedCapture {
            payment_id: &payment_id,
            user_id: &user.id,
            provider: PROVIDER,
            provider_order_id: order_id,
            provider_payment_id: &details.id,
            amount: &details.amount,
            currency: &details.currency,
            plan_id: plan.id,
            metadata: &metadata,
            membership: plan.membership,
            membership_expires_at: &expires_at,
        },
        now.date_naive(),
        state.quota.limits_for(plan.membership),
    )?;

    info!(
        user_id = %user.id,
        order_id,
        plan = plan.id,
        expires_at = %expires_at,
        "Payment captured, membership upgraded"
    );

    Ok(CaptureOrderResponse {
        success: true,
        payment_id: payment.id,
        membership_type: updated.membership(),
        expires_at: updated.membership_expires_at,
        message: Some("Payment successful".into()),
    })
}

fn not_owner(user: &UserRow, order_id: &str) -> ApiError {
    warn!(user_id = %user.id, order_id, "Capture attempted on another account's order");
    ApiError::Forbidden("Order does not belong to this account".into())
}

fn already_captured(row: &PaymentRow, user: &UserRow) -> CaptureOrderResponse {
    CaptureOrderResponse {
        success: true,
        payment_id: row.id.clone(),
        membership_type: user.effective_membership(Utc::now()),
        expires_at: user.membership_expires_at.clone(),
        message: Some("Payment already processed".into()),
    }
}
