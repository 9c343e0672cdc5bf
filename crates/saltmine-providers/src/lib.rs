//! Clients for the upstream services SaltMine depends on: Serper web search,
//! the Tencent ADP chat agent, Gemini completions, PayPal checkout and
//! transactional email.
//!
//! Each client sits behind a trait so the HTTP layer can be exercised with
//! in-process fakes.

pub mod adp;
pub mod error;
pub mod gemini;
pub mod mail;
pub mod paypal;
pub mod serper;

pub use error::ProviderError;
