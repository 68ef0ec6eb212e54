//! Database configuration module for the ledger.
//!
//! This module handles `SQLite` connection setup and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust models. The invariants the storage layer can enforce
//! on its own (one pending game request per wallet and game, one pending withdrawal per wallet,
//! one deposit per chain hash) are added as partial unique indexes on top.

use crate::entities::{GameAccount, Wallet, WalletTransaction, game_account};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/game_ledger.sqlite?mode=rwc";

/// Partial unique indexes that back the ledger invariants at the storage layer.
const INVARIANT_INDEXES: [&str; 3] = [
    // At most one pending credit or redeem per (wallet, game)
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_wallet_tx_pending_game_slot
        ON wallet_transactions(wallet_id, game_name)
        WHERE status = 'pending' AND tx_type IN ('game_credit', 'game_withdrawal')",
    // Single outstanding withdrawal per wallet
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_wallet_tx_pending_withdrawal
        ON wallet_transactions(wallet_id)
        WHERE status = 'pending' AND tx_type = 'withdrawal'",
    // Deposits are idempotent per chain hash
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_wallet_tx_deposit_hash
        ON wallet_transactions(wallet_id, tx_hash)
        WHERE tx_type = 'deposit' AND tx_hash IS NOT NULL",
];

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    ensure_sqlite_directory(&database_url)?;
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates the parent directory of a file-backed `SQLite` URL so `mode=rwc` can create the file.
fn ensure_sqlite_directory(database_url: &str) -> Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Creates all ledger tables and indexes if they do not exist yet.
///
/// Safe to call on every start-up.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut wallet_table = schema.create_table_from_entity(Wallet);
    let mut transaction_table = schema.create_table_from_entity(WalletTransaction);
    let mut game_account_table = schema.create_table_from_entity(GameAccount);
    wallet_table.if_not_exists();
    transaction_table.if_not_exists();
    game_account_table.if_not_exists();

    db.execute(builder.build(&wallet_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;
    db.execute(builder.build(&game_account_table)).await?;

    // One account per (user, game)
    let game_account_index = Index::create()
        .name("idx_game_accounts_user_game")
        .table(GameAccount)
        .col(game_account::Column::UserId)
        .col(game_account::Column::GameName)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&game_account_index)).await?;

    for statement in INVARIANT_INDEXES {
        db.execute_unprepared(statement).await?;
    }

    info!("Ledger tables and invariant indexes ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        game_account::Model as GameAccountModel, wallet::Model as WalletModel,
        wallet_transaction::Model as WalletTransactionModel,
    };
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<WalletModel> = Wallet::find().limit(1).all(&db).await?;
        let _: Vec<WalletTransactionModel> = WalletTransaction::find().limit(1).all(&db).await?;
        let _: Vec<GameAccountModel> = GameAccount::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[test]
    fn test_ensure_sqlite_directory_ignores_memory_urls() -> Result<()> {
        ensure_sqlite_directory("sqlite::memory:")?;
        ensure_sqlite_directory("sqlite://:memory:")?;
        ensure_sqlite_directory("postgres://localhost/ledger")?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
