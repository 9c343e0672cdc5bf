//! Transactional email through the Brevo or Resend HTTP APIs.
//!
//! Brevo is used when its key is set, then Resend. With neither configured
//! messages are only logged, which keeps local development usable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::error::ProviderError;

pub const BREVO_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

const SENDER_NAME: &str = "SaltMine Contact Form";

#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub brevo_api_key: Option<String>,
    pub brevo_from: String,
    pub resend_api_key: Option<String>,
    /// `Name <address>` form is accepted.
    pub resend_from: String,
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            brevo_api_key: None,
            brevo_from: "contact@example.com".to_string(),
            resend_api_key: None,
            resend_from: "SaltMine <noreply@example.com>".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailBackend<'a> {
    Brevo { api_key: &'a str, from: &'a str },
    Resend { api_key: &'a str, from: &'a str },
    LogOnly,
}

impl MailConfig {
    pub fn backend(&self) -> MailBackend<'_> {
        if let Some(api_key) = self.brevo_api_key.as_deref() {
            MailBackend::Brevo {
                api_key,
                from: &self.brevo_from,
            }
        } else if let Some(api_key) = self.resend_api_key.as_deref() {
            MailBackend::Resend {
                api_key,
                from: &self.resend_from,
            }
        } else {
            MailBackend::LogOnly
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), ProviderError>;
}

pub struct HttpMailer {
    http: Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    async fn post(&self, url: &str, request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ProviderError> {
        let response = request
            .timeout(self.config.timeout)
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from_send)?;

        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            if let ProviderError::Http { status, body } = &err {
                error!(status, body = %body, url, "Email API error");
            }
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: &Email) -> Result<(), ProviderError> {
        match self.config.backend() {
            MailBackend::Brevo { api_key, from } => {
                let request = self
                    .http
                    .post(BREVO_API_URL)
                    .header("api-key", api_key)
                    .header("accept", "application/json");
                let sent = self.post(BREVO_API_URL, request, &brevo_body(email, from)).await?;
                info!(message_id = %sent["messageId"], "Email sent through Brevo");
            }
            MailBackend::Resend { api_key, from } => {
                let request = self.http.post(RESEND_API_URL).bearer_auth(api_key);
                let sent = self.post(RESEND_API_URL, request, &resend_body(email, from)).await?;
                info!(id = %sent["id"], "Email sent through Resend");
            }
            MailBackend::LogOnly => {
                warn!("No email service configured, message logged only");
                info!(subject = %email.subject, text = %email.text, "Unsent email");
            }
        }
        Ok(())
    }
}

fn brevo_body(email: &Email, from: &str) -> Value {
    let mut body = json!({
        "sender": { "name": SENDER_NAME, "email": from },
        "to": [{ "email": email.to }],
        "subject": email.subject,
        "htmlContent": email.html,
        "textContent": email.text,
    });
    if let Some(reply_to) = &email.reply_to {
        body["replyTo"] = json!({ "email": reply_to });
    }
    body
}

fn resend_body(email: &Email, from: &str) -> Value {
    let mut body = json!({
        "from": from,
        "to": [email.to],
        "subject": email.subject,
        "html": email.html,
        "text": email.text,
    });
    if let Some(reply_to) = &email.reply_to {
        body["reply_to"] = json!(reply_to);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email {
            to: "team@example.com".into(),
            reply_to: Some("ada@example.com".into()),
            subject: "Hello".into(),
            html: "<p>Hi</p>".into(),
            text: "Hi".into(),
        }
    }

    #[test]
    fn brevo_wins_over_resend() {
        let mut config = MailConfig::default();
        assert_eq!(config.backend(), MailBackend::LogOnly);

        config.resend_api_key = Some("re_1".into());
        assert!(matches!(config.backend(), MailBackend::Resend { api_key: "re_1", .. }));

        config.brevo_api_key = Some("xkeysib".into());
        assert_eq!(
            config.backend(),
            MailBackend::Brevo {
                api_key: "xkeysib",
                from: "contact@example.com"
            }
        );
    }

    #[test]
    fn request_bodies() {
        let brevo = brevo_body(&email(), "from@example.com");
        assert_eq!(brevo["sender"]["email"], "from@example.com");
        assert_eq!(brevo["to"][0]["email"], "team@example.com");
        assert_eq!(brevo["replyTo"]["email"], "ada@example.com");
        assert_eq!(brevo["textContent"], "Hi");

        let mut plain = email();
        plain.reply_to = None;
        let resend = resend_body(&plain, "SaltMine <noreply@example.com>");
        assert_eq!(resend["to"][0], "team@example.com");
        assert_eq!(resend["html"], "<p>Hi</p>");
        assert!(resend.get("reply_to").is_none());
    }

    #[tokio::test]
    async fn unconfigured_mailer_only_logs() {
        let mailer = HttpMailer::new(MailConfig::default());
        assert!(mailer.send(&email()).await.is_ok());
    }
}
