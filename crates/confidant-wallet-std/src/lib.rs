// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # confidant-wallet-std
//!
//! Durable storage backends for `confidant-wallet-core`.
//!
//! This crate provides [`FileWalletStore`], a JSON file-backed implementation
//! of the [`WalletStore`](confidant_wallet_core::WalletStore) trait suitable
//! for single-node deployments that do not need a full database.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confidant_wallet_std::storage::FileWalletStore;
//! use confidant_wallet_core::{
//!     config::Config, signature::SignatureVerifier, WalletEngine,
//! };
//!
//! let storage = FileWalletStore::open("/var/lib/confidant/wallets.json")
//!     .expect("failed to open wallet store");
//!
//! let engine = WalletEngine::new(Config::default(), storage, SignatureVerifier::new("whsec"));
//! ```

pub mod storage;

pub use storage::file::FileWalletStore;
