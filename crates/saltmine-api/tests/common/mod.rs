#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use saltmine_api::keywords::KeywordExtractor;
use saltmine_api::state::QuotaPolicy;
use saltmine_api::{AppState, AppStateInner, build_router};
use saltmine_db::Database;
use saltmine_providers::ProviderError;
use saltmine_providers::adp::{ChatEvent, ChatProvider, ChatRequest, ReplyPayload};
use saltmine_providers::mail::{Email, Mailer};
use saltmine_providers::paypal::{
    CaptureDetails, CapturedOrder, CreatedOrder, OrderRequest, PaymentProvider,
};
use saltmine_providers::serper::{SearchParams, SearchProvider};
use saltmine_types::models::{Platform, SearchPost, SearchResult};

pub const JWT_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "Str0ng!pass";
pub const CONTACT_TO: &str = "team@saltmine.test";

pub const VALID_ANALYSIS: &str = r#"{"summary":"People find it slow.","frustrationScore":64,"insights":[{"title":"Slow sync","severity":"High Severity","category":"Performance","description":"Sync lags.","opportunity":"Faster sync","quote":null}]}"#;

// -- Fakes --

pub struct FakeSearch;

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, platform: Platform, params: &SearchParams) -> Result<SearchResult, ProviderError> {
        let post = SearchPost {
            title: format!("{} complaint", platform),
            link: format!("https://{}/post/1", platform.default_domain()),
            snippet: "it keeps crashing".into(),
            date: None,
            subreddit: (platform == Platform::Reddit).then(|| "apps".to_string()),
            platform,
            position: 1,
            domain: platform.default_domain().into(),
        };
        Ok(SearchResult {
            posts: vec![post],
            total: 1,
            search_time: 0.01,
            query: params.query.clone(),
            platform,
        })
    }
}

/// Replays a fixed list of events for every request.
pub struct ScriptedChat(pub Vec<ChatEvent>);

impl ChatProvider for ScriptedChat {
    fn stream_chat(&self, _request: ChatRequest) -> BoxStream<'static, ChatEvent> {
        futures_util::stream::iter(self.0.clone()).boxed()
    }
}

pub fn reply(content: &str, is_final: bool) -> ChatEvent {
    ChatEvent::Reply {
        payload: ReplyPayload {
            content: content.to_string(),
            is_final,
            ..Default::default()
        },
        message_id: None,
    }
}

/// A well-behaved analysis conversation.
pub fn analysis_script() -> Vec<ChatEvent> {
    let answer = format!("```json\n{}\n```", VALID_ANALYSIS);
    vec![reply("```json", false), reply(&answer, true)]
}

/// Remembers the last order so that captures echo its ids.
#[derive(Default)]
pub struct FakePayments {
    pub capture_calls: AtomicUsize,
    last_order: Mutex<Option<(String, String)>>,
}

impl FakePayments {
    pub fn captures(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    fn order(&self, order_id: &str, status: &str, capture: Option<CaptureDetails>) -> CapturedOrder {
        let (reference_id, custom_id) = self
            .last_order
            .lock()
            .ok()
            .and_then(|last| last.clone())
            .unzip();
        CapturedOrder {
            order_id: order_id.to_string(),
            status: status.into(),
            reference_id,
            custom_id,
            capture,
            raw: json!({ "id": order_id, "status": status }),
        }
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_order(&self, order: &OrderRequest<'_>) -> Result<CreatedOrder, ProviderError> {
        if let Ok(mut last) = self.last_order.lock() {
            *last = Some((order.reference_id.to_string(), order.custom_id.to_string()));
        }
        Ok(CreatedOrder {
            id: "ORDER-1".into(),
            status: "CREATED".into(),
        })
    }

    async fn get_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError> {
        Ok(self.order(order_id, "APPROVED", None))
    }

    async fn capture_order(&self, order_id: &str) -> Result<CapturedOrder, ProviderError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let details = CaptureDetails {
            id: "CAPTURE-1".into(),
            amount: "10.00".into(),
            currency: "USD".into(),
        };
        Ok(self.order(order_id, "COMPLETED", Some(details)))
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<Email>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &Email) -> Result<(), ProviderError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

// -- Harness --

pub struct TestApp {
    pub state: AppState,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_chat(analysis_script())
    }

    pub fn with_chat(script: Vec<ChatEvent>) -> Self {
        let payments = Arc::new(FakePayments::default());
        let mailer = Arc::new(FakeMailer::default());
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().expect("in-memory db"),
            jwt_secret: JWT_SECRET.into(),
            cookie_key: AppStateInner::cookie_key_for(JWT_SECRET),
            quota: QuotaPolicy::default(),
            search: Arc::new(FakeSearch),
            chat: Arc::new(ScriptedChat(script)),
            payments: payments.clone(),
            mailer: mailer.clone(),
            contact_to: Some(CONTACT_TO.into()),
            keywords: KeywordExtractor::disabled(),
        });
        Self { state, payments, mailer }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("utf8 body"),
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, token, Some(body))).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::PATCH, uri, token, Some(body))).await
    }

    /// Registers an account and returns a session token for it.
    pub async fn login_new_user(&self, email: &str) -> String {
        let signup = self
            .post(
                "/api/auth/signup",
                None,
                json!({ "name": "Test User", "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(signup.status, StatusCode::CREATED, "{}", signup.body);

        let login = self
            .post("/api/auth/login", None, json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(login.status, StatusCode::OK, "{}", login.body);
        login.json()["token"].as_str().expect("token").to_string()
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("json body")
    }

    /// `name=value` of the first `Set-Cookie`, ready for a `Cookie` header.
    pub fn cookie(&self) -> Option<String> {
        let raw = self.headers.get(header::SET_COOKIE)?.to_str().ok()?;
        raw.split(';').next().map(str::to_string)
    }

    /// SSE event names in arrival order.
    pub fn event_names(&self) -> Vec<&str> {
        self.body
            .lines()
            .filter_map(|line| line.strip_prefix("event: "))
            .collect()
    }
}
