// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Durable [`WalletStore`](confidant_wallet_core::storage::WalletStore)
//! implementations.

pub mod file;

pub use file::FileWalletStore;
