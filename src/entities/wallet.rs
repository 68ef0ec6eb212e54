//! Wallet entity - One custodial wallet per user.
//!
//! Holds the running USD balance, per-asset sub-balances and the three deposit addresses
//! assigned when the wallet was bootstrapped. The transaction log lives in
//! [`super::wallet_transaction`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Wallet database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    /// Unique identifier for the wallet
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user, at most one wallet per user
    #[sea_orm(unique)]
    pub user_id: String,
    /// Running balance, only ever changed by atomic deltas
    pub total_balance_usd: f64,
    /// BTC deposit address
    #[sea_orm(unique)]
    pub btc_address: String,
    /// Sum of BTC deposits credited to this wallet
    pub btc_balance: f64,
    /// USDT (TRC20) deposit address
    #[sea_orm(unique)]
    pub usdt_trc20_address: String,
    /// Sum of USDT TRC20 deposits credited to this wallet
    pub usdt_trc20_balance: f64,
    /// USDT (BEP20) deposit address
    #[sea_orm(unique)]
    pub usdt_bep20_address: String,
    /// Sum of USDT BEP20 deposits credited to this wallet
    pub usdt_bep20_balance: f64,
    /// Incremented on every balance mutation
    pub version: i64,
    /// Time of the last balance-affecting mutation
    pub last_updated: DateTimeUtc,
    /// When the wallet was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Wallet and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One wallet has many transactions
    #[sea_orm(has_many = "super::wallet_transaction::Entity")]
    Transactions,
}

impl Related<super::wallet_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
