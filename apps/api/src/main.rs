mod config;
mod document;
mod errors;
mod feedback;
mod llm_client;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::feedback::analyzer::{Analyzer, FreeTier, PerThousandTokens, PricingPolicy};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Analyzer API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client. The HTTP timeout matches the analyzer's so neither outlives the other.
    let mut llm = LlmClient::new(config.anthropic_api_key.clone(), config.model_timeout)
        .context("Failed to build LLM HTTP client")?;
    if let Some(url) = &config.anthropic_api_url {
        info!("LLM endpoint overridden: {url}");
        llm = llm.with_api_url(url.clone());
    }
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let pricing: Arc<dyn PricingPolicy> = match config.price_per_1k_tokens {
        Some(usd_per_1k) => {
            info!("Pricing: ${usd_per_1k} per 1k estimated tokens");
            Arc::new(PerThousandTokens { usd_per_1k })
        }
        None => {
            info!("Pricing: free tier");
            Arc::new(FreeTier)
        }
    };

    let analyzer = Analyzer::new(Arc::new(llm), pricing).with_timeout(config.model_timeout);
    info!(
        "Analyzer ready (model timeout {}s, max upload {} bytes)",
        config.model_timeout.as_secs(),
        config.max_upload_bytes
    );

    // Build app state
    let state = AppState {
        analyzer: Arc::new(analyzer),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the front-end origin once it is configurable

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
