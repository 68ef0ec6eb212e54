//! Shared test utilities for the ledger.
//!
//! This module provides common helper functions for setting up test databases,
//! deterministic address generators, and funded players with active game accounts.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        deposit::{DepositRecord, apply_deposit},
        game_profile,
        transaction::get_transactions_for_wallet,
        wallet::{self, AddressGenerator, DepositAddresses},
    },
    entities::{Asset, GameName, TransactionStatus, Wallet, game_account},
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

static FUNDING_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in a temporary directory. Unlike the in-memory
/// database it is served by a pool of connections, so spawned tasks really run concurrently.
/// The directory is removed when the returned `TempDir` drops.
pub async fn setup_file_db() -> Result<(TempDir, DatabaseConnection)> {
    let dir = TempDir::new()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("ledger.sqlite").display()
    );
    let db = sea_orm::Database::connect(&url).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((dir, db))
}

/// Hands out `btc-addr-N`, `trc20-addr-N`, `bep20-addr-N` for N = 1, 2, ...
#[derive(Debug, Default)]
pub struct SequentialAddressGenerator {
    calls: AtomicUsize,
}

impl SequentialAddressGenerator {
    /// Number of address sets generated so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressGenerator for SequentialAddressGenerator {
    async fn generate(&self) -> Result<DepositAddresses> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DepositAddresses {
            btc: format!("btc-addr-{n}"),
            usdt_trc20: format!("trc20-addr-{n}"),
            usdt_bep20: format!("bep20-addr-{n}"),
        })
    }
}

/// Always returns the same three addresses.
#[derive(Debug, Clone)]
pub struct FixedAddressGenerator {
    addresses: DepositAddresses,
}

impl FixedAddressGenerator {
    pub fn new(btc: &str, usdt_trc20: &str, usdt_bep20: &str) -> Self {
        Self {
            addresses: DepositAddresses {
                btc: btc.to_string(),
                usdt_trc20: usdt_trc20.to_string(),
                usdt_bep20: usdt_bep20.to_string(),
            },
        }
    }
}

#[async_trait]
impl AddressGenerator for FixedAddressGenerator {
    async fn generate(&self) -> Result<DepositAddresses> {
        Ok(self.addresses.clone())
    }
}

/// Bootstraps a wallet whose addresses are derived from the user id.
pub async fn bootstrap_test_wallet(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<crate::entities::wallet::Model> {
    let generator = FixedAddressGenerator::new(
        &format!("btc-{user_id}"),
        &format!("trc20-{user_id}"),
        &format!("bep20-{user_id}"),
    );
    wallet::bootstrap_wallet(db, user_id, &generator).await
}

/// Sets up a fresh database with one empty wallet.
/// Returns (db, wallet) for common test scenarios.
pub async fn setup_with_wallet(
    user_id: &str,
) -> Result<(DatabaseConnection, crate::entities::wallet::Model)> {
    let db = setup_test_db().await?;
    let created = bootstrap_test_wallet(&db, user_id).await?;
    Ok((db, created))
}

/// Credits the wallet through a BTC deposit with a unique hash.
pub async fn fund_wallet(db: &DatabaseConnection, user_id: &str, amount: f64) -> Result<()> {
    let seq = FUNDING_SEQ.fetch_add(1, Ordering::SeqCst);
    let record = DepositRecord {
        user_id: user_id.to_string(),
        tx_hash: format!("funding-{user_id}-{seq}"),
        amount,
        asset: Asset::Btc,
        network: None,
    };
    apply_deposit(db, &record).await?;
    Ok(())
}

/// Requests a game profile and activates it with game id `ID-<game>`.
pub async fn setup_active_game(
    db: &DatabaseConnection,
    user_id: &str,
    game: GameName,
) -> Result<game_account::Model> {
    game_profile::request_game_profile(db, user_id, game).await?;
    game_profile::assign_game_id(db, user_id, game, &format!("ID-{game}")).await
}

/// Sets up a player with a wallet funded by `balance` and an active account on `game`.
/// Returns (db, wallet) as it was right after bootstrap.
pub async fn setup_player(
    user_id: &str,
    game: GameName,
    balance: f64,
) -> Result<(DatabaseConnection, crate::entities::wallet::Model)> {
    let db = setup_test_db().await?;
    let created = add_player(&db, user_id, game, balance).await?;
    Ok((db, created))
}

/// Like [`setup_player`], on an existing database.
pub async fn add_player(
    db: &DatabaseConnection,
    user_id: &str,
    game: GameName,
    balance: f64,
) -> Result<crate::entities::wallet::Model> {
    let created = bootstrap_test_wallet(db, user_id).await?;
    if balance > 0.0 {
        fund_wallet(db, user_id, balance).await?;
    }
    setup_active_game(db, user_id, game).await?;
    Ok(created)
}

/// Asserts the wallet balance equals the net effect of its completed entries plus its pending
/// debits.
pub async fn assert_balance_conserved(db: &DatabaseConnection, wallet_id: i64) -> Result<()> {
    let stored = Wallet::find_by_id(wallet_id).one(db).await?.unwrap();
    let log = get_transactions_for_wallet(db, wallet_id).await?;

    let expected: f64 = log
        .iter()
        .map(|entry| match entry.status {
            TransactionStatus::Completed => entry.net_effect(),
            TransactionStatus::Pending if entry.is_pending_debit() => entry.amount,
            _ => 0.0,
        })
        .sum();

    assert!(
        (stored.total_balance_usd - expected).abs() < 1e-9,
        "balance {} does not match log {}",
        stored.total_balance_usd,
        expected
    );
    Ok(())
}
