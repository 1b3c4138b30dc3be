// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for [`WalletEngine`](crate::engine::WalletEngine).
//!
//! Supports two load strategies:
//!
//! 1. **TOML file**: [`load_settings`] reads and deserialises a TOML file
//!    into a [`WalletSettings`] struct.
//! 2. **Environment variables**: [`load_settings_from_env`] reads
//!    `CONFIDANT_`-prefixed environment variables.
//!
//! Either way the result is converted into an engine [`Config`] with
//! `Config::try_from(settings)`, which rejects values the pricing arithmetic
//! cannot work with.
//!
//! # File format
//!
//! ```toml
//! call_cost_per_minute         = 2
//! chat_cost_per_message_pair   = 1
//! free_trial_chat_ceiling_secs = 10800
//! plan_validity_days           = 30
//! signup_free_messages         = 3
//! max_transaction_attempts     = 5
//! ```
//!
//! # Environment variables
//!
//! | Variable                                  | Type    | Default |
//! |-------------------------------------------|---------|---------|
//! | `CONFIDANT_CALL_COST_PER_MINUTE`          | decimal | 2       |
//! | `CONFIDANT_CHAT_COST_PER_MESSAGE_PAIR`    | decimal | 1       |
//! | `CONFIDANT_FREE_TRIAL_CHAT_CEILING_SECS`  | integer | 10800   |
//! | `CONFIDANT_PLAN_VALIDITY_DAYS`            | integer | 30      |
//! | `CONFIDANT_SIGNUP_FREE_MESSAGES`          | integer | 3       |
//! | `CONFIDANT_MAX_TRANSACTION_ATTEMPTS`      | integer | 5       |

#![cfg(feature = "config-loader")]

use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, DAY_MS};

// ---------------------------------------------------------------------------
// WalletSettings
// ---------------------------------------------------------------------------

/// Flat, serialisation-friendly engine settings.
///
/// Missing fields take the production defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    pub call_cost_per_minute: Decimal,
    pub chat_cost_per_message_pair: Decimal,
    pub free_trial_chat_ceiling_secs: u64,
    pub plan_validity_days: u64,
    pub signup_free_messages: u32,
    pub max_transaction_attempts: u32,
}

impl Default for WalletSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            call_cost_per_minute: config.call_cost_per_minute,
            chat_cost_per_message_pair: config.chat_cost_per_message_pair,
            free_trial_chat_ceiling_secs: config.free_trial_chat_ceiling_secs,
            plan_validity_days: config.plan_validity_ms / DAY_MS,
            signup_free_messages: config.signup_free_messages,
            max_transaction_attempts: config.max_transaction_attempts,
        }
    }
}

impl TryFrom<WalletSettings> for Config {
    type Error = ConfigError;

    fn try_from(settings: WalletSettings) -> Result<Self, Self::Error> {
        let plan_validity_ms = settings
            .plan_validity_days
            .checked_mul(DAY_MS)
            .ok_or_else(|| ConfigError::InvalidRange {
                field: "plan_validity_days".into(),
                value: settings.plan_validity_days.to_string(),
                reason: "overflows a millisecond timestamp".into(),
            })?;

        let config = Config {
            call_cost_per_minute: settings.call_cost_per_minute,
            chat_cost_per_message_pair: settings.chat_cost_per_message_pair,
            free_trial_chat_ceiling_secs: settings.free_trial_chat_ceiling_secs,
            plan_validity_ms,
            signup_free_messages: settings.signup_free_messages,
            max_transaction_attempts: settings.max_transaction_attempts,
        };
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file \"{path}\": {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("field \"{field}\": cannot parse \"{value}\": {reason}")]
    ParseField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("field \"{field}\": value \"{value}\" out of range: {reason}")]
    InvalidRange {
        field: String,
        value: String,
        reason: String,
    },

    #[error("missing required setting \"{0}\"")]
    Missing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML loader
// ---------------------------------------------------------------------------

/// Load [`WalletSettings`] from a TOML file.
///
/// # Example
///
/// ```rust,no_run
/// use confidant_wallet_core::config::Config;
/// use confidant_wallet_core::config_loader::load_settings;
///
/// let settings = load_settings("/etc/confidant/wallet.toml").unwrap();
/// let config = Config::try_from(settings).unwrap();
/// println!("call rate: {}", config.call_cost_per_minute);
/// ```
pub fn load_settings(path: impl AsRef<Path>) -> Result<WalletSettings, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    parse_settings(&content)
}

/// Parse [`WalletSettings`] from TOML text.
pub fn parse_settings(content: &str) -> Result<WalletSettings, ConfigError> {
    Ok(toml::from_str::<WalletSettings>(content)?)
}

// ---------------------------------------------------------------------------
// Environment variable loader
// ---------------------------------------------------------------------------

/// Load [`WalletSettings`] from `CONFIDANT_`-prefixed environment variables.
///
/// Unset variables fall back to their defaults.
pub fn load_settings_from_env() -> Result<WalletSettings, ConfigError> {
    load_settings_with(|key| std::env::var(key).ok())
}

/// Like [`load_settings_from_env`], reading variables through `lookup`.
pub fn load_settings_with<L>(lookup: L) -> Result<WalletSettings, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let defaults = WalletSettings::default();
    Ok(WalletSettings {
        call_cost_per_minute: read_var(
            &lookup,
            "CONFIDANT_CALL_COST_PER_MINUTE",
            defaults.call_cost_per_minute,
        )?,
        chat_cost_per_message_pair: read_var(
            &lookup,
            "CONFIDANT_CHAT_COST_PER_MESSAGE_PAIR",
            defaults.chat_cost_per_message_pair,
        )?,
        free_trial_chat_ceiling_secs: read_var(
            &lookup,
            "CONFIDANT_FREE_TRIAL_CHAT_CEILING_SECS",
            defaults.free_trial_chat_ceiling_secs,
        )?,
        plan_validity_days: read_var(
            &lookup,
            "CONFIDANT_PLAN_VALIDITY_DAYS",
            defaults.plan_validity_days,
        )?,
        signup_free_messages: read_var(
            &lookup,
            "CONFIDANT_SIGNUP_FREE_MESSAGES",
            defaults.signup_free_messages,
        )?,
        max_transaction_attempts: read_var(
            &lookup,
            "CONFIDANT_MAX_TRANSACTION_ATTEMPTS",
            defaults.max_transaction_attempts,
        )?,
    })
}

/// Parse variable `key` through `lookup`, or return `default` when unset.
pub fn read_var<T, L>(lookup: &L, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|source| ConfigError::ParseField {
                field: key.to_owned(),
                value,
                reason: source.to_string(),
            }),
        None => Ok(default),
    }
}

/// Variable `key` through `lookup`; unset or blank is [`ConfigError::Missing`].
pub fn require_var<L>(lookup: &L, key: &str) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_owned()))
}
