//! PayPal Orders v2 client (create, lookup and capture).

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};

use crate::error::ProviderError;

const LIVE_API_BASE: &str = "https://api-m.paypal.com";
const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaypalMode {
    #[default]
    Sandbox,
    Live,
}

impl PaypalMode {
    /// Anything other than `live` means sandbox.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("live") { Self::Live } else { Self::Sandbox }
    }

    pub const fn api_base(&self) -> &'static str {
        match self {
            Self::Live => LIVE_API_BASE,
            Self::Sandbox => SANDBOX_API_BASE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaypalConfig {
    pub mode: PaypalMode,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// What the merchant asks PayPal to charge.
#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    /// Decimal string, e.g. `10.00`.
    pub amount: &'a str,
    pub currency: &'a str,
    /// Echoed back on capture as `purchase_units[0].reference_id`.
    pub reference_id: &'a str,
    /// Echoed back on capture as `purchase_units[0].custom_id`.
    pub custom_id: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureDetails {
    pub id: String,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CapturedOrder {
    pub order_id: String,
    pub status: String,
    pub reference_id: Option<String>,
    pub custom_id: Option<String>,
    pub capture: Option<CaptureDetails>,
    /// Full response body, kept as payment metadata.
    pub raw: Value,
}

impl CapturedOrder {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(&self, order: &OrderRequest<'_>) -> Result<CreatedOrder, ProviderError>;

    /// Reads an order without changing it. The result has the same shape as
    /// a capture; `capture` is empty until the order has been paid.
    async fn get_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError>;

    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError>;
}

pub struct PaypalClient {
    http: Client,
    config: PaypalConfig,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

impl PaypalClient {
    pub fn new(config: PaypalConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let (Some(id), Some(secret)) = (&self.config.client_id, &self.config.client_secret) else {
            return Err(ProviderError::NotConfigured("PAYPAL_CLIENT_ID/PAYPAL_CLIENT_SECRET"));
        };

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.mode.api_base()))
            .basic_auth(id, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(ProviderError::from_send)?;

        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            if let ProviderError::Http { status, body } = &err {
                error!(status, body = %body, "PayPal token request failed");
            }
            return Err(err);
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn paypal_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.mode.api_base(), path);

        let mut request = self.http.request(method, &url).bearer_auth(token);
        request = match body {
            Some(b) => request.json(&b),
            // Capture takes an empty JSON body
            None => request.header("Content-Type", "application/json"),
        };

        let response = request.send().await.map_err(ProviderError::from_send)?;
        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            if let ProviderError::Http { status, body } = &err {
                error!(status, body = %body, path, "PayPal API error");
            }
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

fn order_body(order: &OrderRequest<'_>) -> Value {
    json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": order.reference_id,
            "custom_id": order.custom_id,
            "description": order.description,
            "amount": {
                "currency_code": order.currency,
                "value": order.amount,
            },
        }],
    })
}

#[derive(Deserialize, Default)]
struct CaptureResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize, Default)]
struct PurchaseUnit {
    reference_id: Option<String>,
    custom_id: Option<String>,
    payments: Option<Payments>,
}

#[derive(Deserialize, Default)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
    amount: Option<Money>,
    // Some responses put custom_id on the capture instead of the unit
    custom_id: Option<String>,
}

#[derive(Deserialize)]
struct Money {
    value: String,
    currency_code: String,
}

/// Pulls the fields the capture flow needs out of a capture response.
pub fn parse_capture(raw: Value) -> Result<CapturedOrder, ProviderError> {
    let parsed: CaptureResponse =
        serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let unit = parsed.purchase_units.into_iter().next().unwrap_or_default();
    let first = unit.payments.and_then(|p| p.captures.into_iter().next());

    let custom_id = unit
        .custom_id
        .or_else(|| first.as_ref().and_then(|c| c.custom_id.clone()));
    let capture = first.map(|c| {
        let (amount, currency) = c
            .amount
            .map(|m| (m.value, m.currency_code))
            .unwrap_or_default();
        CaptureDetails {
            id: c.id,
            amount,
            currency,
        }
    });

    Ok(CapturedOrder {
        order_id: parsed.id,
        status: parsed.status,
        reference_id: unit.reference_id,
        custom_id,
        capture,
        raw,
    })
}

#[async_trait]
impl PaymentProvider for PaypalClient {
    #[instrument(skip(self, order), fields(reference_id = %order.reference_id))]
    async fn create_order(&self, order: &OrderRequest<'_>) -> Result<CreatedOrder, ProviderError> {
        let created: CreatedOrder = self
            .paypal_request(Method::POST, "/v2/checkout/orders", Some(order_body(order)))
            .await?;
        info!(order_id = %created.id, status = %created.status, "PayPal order created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError> {
        let raw: Value = self
            .paypal_request(Method::GET, &format!("/v2/checkout/orders/{}", order_id), None)
            .await?;
        parse_capture(raw)
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError> {
        let raw: Value = self
            .paypal_request(
                Method::POST,
                &format!("/v2/checkout/orders/{}/capture", order_id),
                None,
            )
            .await?;
        let captured = parse_capture(raw)?;
        debug!(status = %captured.status, "PayPal order captured");
        Ok(captured)
    }
}
