//! Entity module - Contains all SeaORM entity definitions for the ledger.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

/// Per-user, per-game accounts
pub mod game_account;
/// Wallets and their deposit addresses
pub mod wallet;
/// Append-only wallet transaction log
pub mod wallet_transaction;

// Re-export specific types to avoid conflicts
pub use game_account::{
    Column as GameAccountColumn, CreditStatus, Entity as GameAccount, GameName,
    Model as GameAccountModel, ProfileStatus,
};
pub use wallet::{Column as WalletColumn, Entity as Wallet, Model as WalletModel};
pub use wallet_transaction::{
    Asset, Column as WalletTransactionColumn, Entity as WalletTransaction,
    Model as WalletTransactionModel, Network, TransactionStatus, TransactionType,
};
