mod api;
mod capabilities;
mod config;
mod errors;
mod events;
mod options;
mod orchestrator;
mod prompts;
mod providers;
mod session;
mod util;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::{
    api::{AppState, SignatureAuth},
    errors::Result,
    orchestrator::Studio,
    providers::gemini::GeminiProvider,
    util::{format_local, now_local},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = config::AppConfig::load()?;
    let bind_addr = config.server.bind_addr;
    let auth = config
        .server
        .auth
        .as_ref()
        .map(|cfg| Arc::new(SignatureAuth::from_config(cfg)));

    if auth.is_none() {
        info!(target: "api", "signature auth disabled, /api routes are open");
    }

    let provider = Arc::new(GeminiProvider::from_config(&config.gemini)?);
    info!(
        text_model = %config.gemini.text_model,
        image_model = %config.gemini.image_model,
        timeout_secs = config.gemini.request_timeout.as_secs(),
        "generation provider ready"
    );

    let (broadcaster, _bus_rx) = events::message_bus();
    let studio = Arc::new(Studio::new(provider, &config, Some(broadcaster.clone())));
    let state = AppState::new(studio, auth, broadcaster, config.server.max_body_bytes);

    let server = tokio::spawn(async move {
        if let Err(err) = api::run_server(bind_addr, state).await {
            error!(target: "api", error = ?err, "HTTP server exited");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = server => {
            error!("HTTP server task stopped");
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_timer(LocalTimer)
        .init();

    info!("tracing initialized");
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = now_local();
        write!(w, "{}", format_local(&now, "%Y-%m-%d %H:%M:%S%:z"))
    }
}
