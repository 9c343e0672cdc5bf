//! Contact form relay: validates a submission and mails it to the team.

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{info, warn};

use saltmine_providers::mail::Email;
use saltmine_types::api::{ContactRequest, ContactResponse};

use crate::auth::normalize_email;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 5000;
const THANKS: &str = "Thank you for contacting us, we will reply soon!";

/// `POST /api/contact/send`
pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<Json<ContactResponse>> {
    let form = ContactForm::validate(&req)?;

    let Some(to) = state.contact_to.as_deref() else {
        warn!("CONTACT_TO_EMAIL not set, contact submission logged only");
        info!(name = form.name, email = %form.email, company = form.company, message = form.message, "Contact submission");
        return Ok(Json(thanks()));
    };

    state.mailer.send(&form.to_email(to)).await?;
    info!(name = form.name, email = %form.email, company = form.company, "Contact message sent");
    Ok(Json(thanks()))
}

fn thanks() -> ContactResponse {
    ContactResponse {
        success: true,
        message: THANKS.into(),
    }
}

struct ContactForm<'a> {
    name: &'a str,
    email: String,
    company: &'a str,
    message: &'a str,
}

impl<'a> ContactForm<'a> {
    fn validate(req: &'a ContactRequest) -> ApiResult<Self> {
        let (name, company, message) = (req.name.trim(), req.company.trim(), req.message.trim());
        if name.is_empty() || req.email.trim().is_empty() || company.is_empty() || message.is_empty() {
            return Err(ApiError::BadRequest("All fields are required".into()));
        }
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ApiError::BadRequest("Message is too long".into()));
        }
        Ok(Self {
            name,
            email: normalize_email(&req.email)?,
            company,
            message,
        })
    }

    fn to_email(&self, to: &str) -> Email {
        let submitted = Utc::now().format("%Y-%m-%d %H:%M UTC");
        let text = format!(
            "New SaltMine contact form submission\n\n\
             Name: {}\nEmail: {}\nCompany: {}\n\nMessage:\n{}\n\n---\nSubmitted: {}\n",
            self.name, self.email, self.company, self.message, submitted
        );
        let html = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>\
             <h1>New SaltMine enquiry</h1>\
             <p><strong>Name:</strong> {name}</p>\
             <p><strong>Email:</strong> <a href=\"mailto:{email}\">{email}</a></p>\
             <p><strong>Company:</strong> {company}</p>\
             <p><strong>Message:</strong></p>\
             <div style=\"white-space: pre-wrap\">{message}</div>\
             <p style=\"color: #6b7280; font-size: 12px\">Submitted: {submitted}</p>\
             </body></html>",
            name = escape_html(self.name),
            email = escape_html(&self.email),
            company = escape_html(self.company),
            message = escape_html(self.message),
            submitted = submitted,
        );

        Email {
            to: to.to_string(),
            reply_to: Some(self.email.clone()),
            subject: format!("[SaltMine Contact] Enquiry from {}", self.name),
            html,
            text,
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, company: &str, message: &str) -> ContactRequest {
        ContactRequest {
            name: name.into(),
            email: email.into(),
            company: company.into(),
            message: message.into(),
        }
    }

    #[test]
    fn every_field_is_required() {
        let req = request("Ada", "ada@example.com", "  ", "Hi");
        let err = ContactForm::validate(&req).err().unwrap();
        assert_eq!(err.to_string(), "All fields are required");

        let req = request("Ada", "not-an-email", "Acme", "Hi");
        assert!(matches!(ContactForm::validate(&req), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn submissions_are_escaped_in_html_only() {
        let req = request("Ada <b>", "Ada@Example.com", "Acme & Co", "Line one\n<script>");
        let email = ContactForm::validate(&req).unwrap().to_email("team@example.com");

        assert_eq!(email.to, "team@example.com");
        assert_eq!(email.reply_to.as_deref(), Some("ada@example.com"));
        assert_eq!(email.subject, "[SaltMine Contact] Enquiry from Ada <b>");
        assert!(email.html.contains("Ada &lt;b&gt;"));
        assert!(email.html.contains("Acme &amp; Co"));
        assert!(!email.html.contains("<script>"));
        assert!(email.text.contains("Line one\n<script>"));
    }
}
