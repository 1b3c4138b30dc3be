// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! File-based JSON wallet store.
//!
//! [`FileWalletStore`] persists every wallet, ledger entry, settlement marker
//! and processed payment id to a single JSON file.  Every mutation flushes
//! the file atomically (write-rename) before it becomes visible, so a crash
//! mid-write never corrupts existing data and a failed write never leaves
//! memory ahead of disk.
//!
//! ## Layout
//!
//! ```json
//! {
//!   "wallets":            { "<user_id>": Wallet, ... },
//!   "settled_sessions":   { "<user_id>:<session_id>": <usage index>, ... },
//!   "processed_payments": { "<payment_id>": ProcessedPayment, ... },
//!   "usage":              [ UsageLedgerEntry, ... ],
//!   "recharges":          [ RechargeLedgerEntry, ... ]
//! }
//! ```
//!
//! ## Caveats
//!
//! * The whole snapshot is rewritten on every commit.  It suits a single
//!   node with modest write rates, not a high-volume deployment.
//! * Concurrent access from multiple processes is not supported.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use confidant_wallet_core::error::StoreError;
use confidant_wallet_core::storage::{WalletCommit, WalletStore, WalletTables};
use confidant_wallet_core::types::{LedgerFilter, RechargeLedgerEntry, UsageLedgerEntry, Wallet};
use parking_lot::Mutex;
use tracing::error;

struct Inner {
    path: PathBuf,
    tables: WalletTables,
}

/// A file-backed [`WalletStore`] that persists state as JSON.
///
/// Clones share the same file and in-memory tables.
///
/// # Examples
///
/// ```rust,no_run
/// use confidant_wallet_std::storage::file::FileWalletStore;
/// use confidant_wallet_core::storage::WalletStore;
/// use confidant_wallet_core::types::Wallet;
///
/// let store = FileWalletStore::open("/tmp/wallets.json")
///     .expect("could not open wallet store");
///
/// store.create_wallet(Wallet::new("user-1", 3, 0)).unwrap();
/// assert!(store.get_wallet("user-1").unwrap().is_some());
/// ```
#[derive(Clone)]
pub struct FileWalletStore {
    inner: Arc<Mutex<Inner>>,
}

impl FileWalletStore {
    /// Open an existing JSON store, or start an empty one if the path does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the file exists but cannot be read or if
    /// the JSON is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|error| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("wallet store JSON parse error: {}", error),
                )
            })?
        } else {
            WalletTables::new()
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { path, tables })),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Write the current state to disk.
    pub fn flush(&self) -> io::Result<()> {
        let inner = self.inner.lock();
        write_atomically(&inner.path, &inner.tables)
    }

    /// Apply `mutate` to a copy of the tables, persist the copy, then swap
    /// it in.  Nothing changes in memory unless the write succeeded.
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut WalletTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        let mut staged = inner.tables.clone();
        let output = mutate(&mut staged)?;

        if let Err(err) = write_atomically(&inner.path, &staged) {
            error!(path = %inner.path.display(), error = %err, "wallet store flush failed");
            return Err(StoreError::Backend(format!(
                "failed to persist wallet store: {}",
                err
            )));
        }
        inner.tables = staged;
        Ok(output)
    }
}

/// Write `tables` to `<path>.tmp`, then rename it over `path`.
fn write_atomically(path: &Path, tables: &WalletTables) -> io::Result<()> {
    let json = serde_json::to_string_pretty(tables).map_err(|error| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("wallet store serialisation error: {}", error),
        )
    })?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl WalletStore for FileWalletStore {
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.inner.lock().tables.wallet(user_id))
    }

    fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        self.mutate(|tables| tables.insert_wallet(wallet))
    }

    fn commit(&self, user_id: &str, commit: WalletCommit) -> Result<Wallet, StoreError> {
        self.mutate(|tables| tables.apply(user_id, commit))
    }

    fn find_usage(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<UsageLedgerEntry>, StoreError> {
        Ok(self.inner.lock().tables.find_usage(user_id, session_id))
    }

    fn is_payment_processed(&self, payment_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().tables.is_payment_processed(payment_id))
    }

    fn query_usage(&self, filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, StoreError> {
        Ok(self.inner.lock().tables.query_usage(filter))
    }

    fn query_recharges(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<RechargeLedgerEntry>, StoreError> {
        Ok(self.inner.lock().tables.query_recharges(filter))
    }
}
