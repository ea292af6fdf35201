// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

use careerline::config::{self, Config};
use careerline::model::{GeminiClient, ModelClient};
use careerline::relay;
use careerline::throttle;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "careerline", about = "Streaming chat relay for the career-center assistant")]
struct Cli {
    /// Path to a careerline.yaml config file. Built-in defaults when omitted.
    #[arg(long, env = "CAREERLINE_CONFIG")]
    config: Option<String>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "CAREERLINE_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "CAREERLINE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "careerline starting");

    let config = match cli.config {
        Some(path) => {
            let source = config::FileSource {
                path: std::path::PathBuf::from(path),
            };
            match config::load_config(&source) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("failed to load config: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    tracing::info!(
        version = %config.version,
        environment = %config.environment,
        model = %config.model.name,
        api_key_env = %config.model.api_key_env,
        throttle = ?config.throttle,
        config_hash = %config.config_hash,
        "config loaded"
    );

    if std::env::var(&config.model.api_key_env).map_or(true, |v| v.trim().is_empty()) {
        tracing::warn!(
            api_key_env = %config.model.api_key_env,
            "API key not set; chat requests will fail until it is"
        );
    }

    let model: Arc<dyn ModelClient> =
        Arc::new(GeminiClient::new(reqwest::Client::new(), &config.model));
    let throttle = throttle::build_throttle(&config.throttle);
    let app = relay::build_router(relay::AppState::from_config(&config, model, throttle));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "careerline listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
