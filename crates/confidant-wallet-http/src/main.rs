// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

use std::sync::Arc;

use confidant_wallet_core::config_loader::ConfigError;
use confidant_wallet_core::order::HttpGateway;
use confidant_wallet_core::signature::SignatureVerifier;
use confidant_wallet_http::settings::ServerSettings;
use confidant_wallet_http::{router, AppState};
use confidant_wallet_std::FileWalletStore;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "confidant-wallet-http terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let settings = ServerSettings::from_env()?;
    let config = settings.engine_config(|key| std::env::var(key).ok())?;
    info!(?settings, ?config, "starting confidant-wallet-http");

    let store = FileWalletStore::open(&settings.store_path)?;
    let gateway = HttpGateway::new(settings.gateway.clone());
    let state = AppState::new(
        config,
        Arc::new(store),
        SignatureVerifier::new(settings.webhook_secret.as_bytes()),
        Arc::new(gateway),
    );

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(addr = %settings.bind, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServerError::Server(err.to_string()))?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
