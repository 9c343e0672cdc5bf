mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use saltmine_api::keywords::KeywordExtractor;
use saltmine_api::{AppStateInner, build_router};
use saltmine_db::Database;
use saltmine_providers::adp::AdpClient;
use saltmine_providers::gemini::{CompletionProvider, GeminiClient};
use saltmine_providers::mail::{HttpMailer, MailBackend};
use saltmine_providers::paypal::PaypalClient;
use saltmine_providers::serper::SerperClient;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saltmine=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Database::open(&config.db_path)?;

    // Upstream clients
    if config.serper.api_key.is_none() {
        warn!("SERPER_API_KEY not set, searches will fail");
    }
    if config.adp.app_key.is_none() {
        warn!("TENCENT_ADP_APP_KEY not set, analysis and chat will fail");
    }
    if config.mail.backend() == MailBackend::LogOnly {
        warn!("BREVO_API_KEY and RESEND_API_KEY not set, contact messages will only be logged");
    }
    let llm: Option<Arc<dyn CompletionProvider>> = match config.gemini.clone() {
        Some(gemini) => Some(Arc::new(GeminiClient::new(gemini))),
        None => {
            info!("GEMINI_API_KEY not set, keyword extraction disabled");
            None
        }
    };

    let state = Arc::new(AppStateInner {
        db,
        cookie_key: AppStateInner::cookie_key_for(&config.jwt_secret),
        jwt_secret: config.jwt_secret.clone(),
        quota: config.quota,
        search: Arc::new(SerperClient::new(config.serper.clone())),
        chat: Arc::new(AdpClient::new(config.adp.clone())),
        payments: Arc::new(PaypalClient::new(config.paypal.clone())),
        mailer: Arc::new(HttpMailer::new(config.mail.clone())),
        contact_to: config.contact_to.clone(),
        keywords: KeywordExtractor::new(llm, config.keyword_extraction),
    });

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SaltMine server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
