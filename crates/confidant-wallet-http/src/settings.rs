// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Process settings for the HTTP server.
//!
//! | Variable                       | Required | Default                           |
//! |--------------------------------|----------|-----------------------------------|
//! | `CONFIDANT_HTTP_BIND`          | no       | `127.0.0.1:8080`                  |
//! | `CONFIDANT_STORE_PATH`         | no       | `confidant-wallets.json`          |
//! | `CONFIDANT_WEBHOOK_SECRET`     | yes      |                                   |
//! | `CONFIDANT_GATEWAY_URL`        | no       | `https://sandbox.cashfree.com/pg` |
//! | `CONFIDANT_GATEWAY_APP_ID`     | yes      |                                   |
//! | `CONFIDANT_GATEWAY_SECRET_KEY` | yes      |                                   |
//! | `CONFIDANT_CONFIG`             | no       | engine settings from env          |
//!
//! Engine tunables come from the TOML file named by `CONFIDANT_CONFIG` when
//! set, otherwise from the `CONFIDANT_` engine variables.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use confidant_wallet_core::config::Config;
use confidant_wallet_core::config_loader::{
    load_settings, load_settings_with, read_var, require_var, ConfigError,
};
use confidant_wallet_core::order::GatewayConfig;

pub struct ServerSettings {
    pub bind: SocketAddr,
    pub store_path: PathBuf,
    pub webhook_secret: String,
    pub gateway: GatewayConfig,
    pub config_path: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = GatewayConfig::default();
        Ok(Self {
            bind: read_var(
                &lookup,
                "CONFIDANT_HTTP_BIND",
                SocketAddr::from(([127, 0, 0, 1], 8080)),
            )?,
            store_path: read_var(
                &lookup,
                "CONFIDANT_STORE_PATH",
                PathBuf::from("confidant-wallets.json"),
            )?,
            webhook_secret: require_var(&lookup, "CONFIDANT_WEBHOOK_SECRET")?,
            gateway: GatewayConfig {
                base_url: read_var(&lookup, "CONFIDANT_GATEWAY_URL", defaults.base_url.clone())?,
                app_id: require_var(&lookup, "CONFIDANT_GATEWAY_APP_ID")?,
                secret_key: require_var(&lookup, "CONFIDANT_GATEWAY_SECRET_KEY")?,
                ..defaults
            },
            config_path: lookup("CONFIDANT_CONFIG")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Engine configuration from the TOML file, or from `lookup`.
    pub fn engine_config<L>(&self, lookup: L) -> Result<Config, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let settings = match self.config_path {
            Some(ref path) => load_settings(path)?,
            None => load_settings_with(lookup)?,
        };
        Config::try_from(settings)
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("bind", &self.bind)
            .field("store_path", &self.store_path)
            .field("webhook_secret", &"<redacted>")
            .field("gateway", &self.gateway)
            .field("config_path", &self.config_path)
            .finish()
    }
}
