//! Server configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use saltmine_api::state::QuotaPolicy;
use saltmine_providers::adp::AdpConfig;
use saltmine_providers::gemini::GeminiConfig;
use saltmine_providers::mail::MailConfig;
use saltmine_providers::paypal::{PaypalConfig, PaypalMode};
use saltmine_providers::serper::SerperConfig;

/// Well-known sample values that must never sign real sessions.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-here",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub quota: QuotaPolicy,
    pub keyword_extraction: bool,
    pub serper: SerperConfig,
    pub adp: AdpConfig,
    /// Keyword extraction is off when no Gemini key is configured.
    pub gemini: Option<GeminiConfig>,
    pub paypal: PaypalConfig,
    pub mail: MailConfig,
    pub contact_to: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("SALTMINE_JWT_SECRET").ok_or(ConfigError::Missing("SALTMINE_JWT_SECRET"))?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::Placeholder("SALTMINE_JWT_SECRET"));
        }

        let host = var("SALTMINE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(var("SALTMINE_PORT"), 3000, "SALTMINE_PORT")?;
        let db_path = PathBuf::from(var("SALTMINE_DB_PATH").unwrap_or_else(|| "saltmine.db".into()));

        let defaults = QuotaPolicy::default();
        let mut quota = defaults;
        quota.guest_daily_searches = parse_or(
            var("SALTMINE_GUEST_DAILY_SEARCHES"),
            defaults.guest_daily_searches,
            "SALTMINE_GUEST_DAILY_SEARCHES",
        )?;
        quota.free.searches = parse_or(
            var("SALTMINE_FREE_DAILY_SEARCHES"),
            defaults.free.searches,
            "SALTMINE_FREE_DAILY_SEARCHES",
        )?;
        let keyword_extraction = parse_or(var("SALTMINE_KEYWORD_EXTRACTION"), true, "SALTMINE_KEYWORD_EXTRACTION")?;

        let mut serper = SerperConfig::default();
        if let Some(url) = var("SERPER_API_URL") {
            serper.api_url = url;
        }
        serper.api_key = var("SERPER_API_KEY");
        serper.timeout = Duration::from_millis(parse_or(var("SERPER_TIMEOUT_MS"), 10_000, "SERPER_TIMEOUT_MS")?);

        let mut adp = AdpConfig::default();
        if let Some(url) = var("TENCENT_ADP_API_URL") {
            adp.api_url = url;
        }
        adp.app_key = var("TENCENT_ADP_APP_KEY");
        adp.timeout = Duration::from_millis(parse_or(
            var("TENCENT_ADP_TIMEOUT_MS"),
            30_000,
            "TENCENT_ADP_TIMEOUT_MS",
        )?);

        let gemini = var("GEMINI_API_KEY").map(|key| {
            let mut gemini = GeminiConfig::new(key);
            if let Some(model) = var("GEMINI_MODEL") {
                gemini.model = model;
            }
            if let Some(url) = var("GEMINI_BASE_URL") {
                gemini.base_url = url;
            }
            gemini
        });

        let paypal = PaypalConfig {
            mode: var("PAYPAL_MODE").map(|m| PaypalMode::parse(&m)).unwrap_or_default(),
            client_id: var("PAYPAL_CLIENT_ID"),
            client_secret: var("PAYPAL_CLIENT_SECRET"),
        };

        let mut mail = MailConfig::default();
        mail.brevo_api_key = var("BREVO_API_KEY");
        if let Some(from) = var("BREVO_FROM_EMAIL") {
            mail.brevo_from = from;
        }
        mail.resend_api_key = var("RESEND_API_KEY");
        if let Some(from) = var("RESEND_FROM_EMAIL") {
            mail.resend_from = from;
        }
        let contact_to = var("CONTACT_TO_EMAIL");

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            quota,
            keyword_extraction,
            serper,
            adp,
            gemini,
            paypal,
            mail,
            contact_to,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T, name: &'static str) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("{0} is still a placeholder value")]
    Placeholder(&'static str),
}
