//! Wallet business logic - bootstrap, lookups and balance mutation.
//!
//! Balances are never recomputed from the transaction log. Every change goes through
//! [`credit_balance`], [`debit_balance`] or [`credit_deposit_balance`], each a single
//! `UPDATE ... SET balance = balance + delta` statement so concurrent writers cannot lose
//! each other's updates. Debits carry their sufficiency check in the same statement.

use crate::{
    entities::{Asset, Network, Wallet, wallet},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// The three deposit addresses assigned to a new wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepositAddresses {
    /// Bitcoin address
    pub btc: String,
    /// USDT address on TRON
    pub usdt_trc20: String,
    /// USDT address on BNB Smart Chain
    pub usdt_bep20: String,
}

/// External service that derives fresh deposit addresses.
///
/// Called at most once per user, when the wallet is first bootstrapped.
#[async_trait]
pub trait AddressGenerator: Send + Sync {
    /// Generates a new, globally unique set of deposit addresses.
    async fn generate(&self) -> Result<DepositAddresses>;

    /// Takes back a set that was generated but never stored, so it can be handed out again.
    async fn release(&self, _addresses: DepositAddresses) {}
}

/// Balances and addresses of a wallet, without its transaction log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    /// Owning user
    pub user_id: String,
    /// Running USD balance
    pub total_balance_usd: f64,
    /// BTC deposit address and credited deposits
    pub btc: AssetBalance,
    /// USDT TRC20 deposit address and credited deposits
    pub usdt_trc20: AssetBalance,
    /// USDT BEP20 deposit address and credited deposits
    pub usdt_bep20: AssetBalance,
    /// Time of the last balance-affecting mutation
    pub last_updated: DateTime<Utc>,
}

/// Address and deposit sub-balance for one asset/network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetBalance {
    /// Deposit address
    pub address: String,
    /// Sum of deposits received on this address
    pub balance: f64,
}

/// Deposit addresses of one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletAddresses {
    /// Owning user
    pub user_id: String,
    /// BTC address
    pub btc: String,
    /// USDT TRC20 address
    pub trc20: String,
    /// USDT BEP20 address
    pub bep20: String,
}

/// Every wallet's deposit addresses, for the deposit watcher and admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressListing {
    /// BTC addresses in wallet creation order
    pub btc_addresses: Vec<String>,
    /// TRC20 addresses in wallet creation order
    pub trc20_addresses: Vec<String>,
    /// BEP20 addresses in wallet creation order
    pub bep20_addresses: Vec<String>,
    /// Per-user view
    pub detailed: Vec<WalletAddresses>,
    /// Number of wallets listed
    pub total_wallets: usize,
    /// Distinct addresses per network `(btc, trc20, bep20)`
    pub unique_addresses: (usize, usize, usize),
}

impl From<wallet::Model> for WalletSummary {
    fn from(wallet: wallet::Model) -> Self {
        Self {
            user_id: wallet.user_id,
            total_balance_usd: wallet.total_balance_usd,
            btc: AssetBalance {
                address: wallet.btc_address,
                balance: wallet.btc_balance,
            },
            usdt_trc20: AssetBalance {
                address: wallet.usdt_trc20_address,
                balance: wallet.usdt_trc20_balance,
            },
            usdt_bep20: AssetBalance {
                address: wallet.usdt_bep20_address,
                balance: wallet.usdt_bep20_balance,
            },
            last_updated: wallet.last_updated,
        }
    }
}

/// Rejects zero, negative and non-finite amounts.
pub(crate) fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Resolves the network an asset moves on. BTC has exactly one network; USDT must name
/// TRC20 or BEP20.
pub fn resolve_network(asset: Asset, network: Option<Network>) -> Result<Network> {
    match (asset, network) {
        (Asset::Btc, None | Some(Network::Btc)) => Ok(Network::Btc),
        (Asset::Usdt, Some(network @ (Network::Trc20 | Network::Bep20))) => Ok(network),
        (Asset::Usdt, None) => Err(Error::Validation {
            message: "Network (trc20 or bep20) is required for USDT".to_string(),
        }),
        (asset, Some(network)) => Err(Error::Validation {
            message: format!("Network {network} is not valid for asset {asset}"),
        }),
    }
}

/// Finds the wallet owned by `user_id`.
pub async fn get_wallet_by_user<C>(db: &C, user_id: &str) -> Result<Option<wallet::Model>>
where
    C: ConnectionTrait,
{
    Wallet::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_wallet_by_user`], but a missing wallet is an error.
pub async fn require_wallet<C>(db: &C, user_id: &str) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    get_wallet_by_user(db, user_id)
        .await?
        .ok_or_else(|| Error::WalletNotFound {
            user_id: user_id.to_string(),
        })
}

/// Creates the user's wallet with freshly generated addresses and zero balances.
///
/// Idempotent: if the user already has a wallet it is returned unchanged and the generator is
/// not called. A concurrent bootstrap that wins the insert race is also returned, and the
/// addresses generated for the losing attempt are released back to the generator.
#[instrument(skip(db, generator))]
pub async fn bootstrap_wallet<C, G>(db: &C, user_id: &str, generator: &G) -> Result<wallet::Model>
where
    C: ConnectionTrait,
    G: AddressGenerator + ?Sized,
{
    if user_id.trim().is_empty() {
        return Err(Error::Validation {
            message: "user id cannot be empty".to_string(),
        });
    }

    if let Some(existing) = get_wallet_by_user(db, user_id).await? {
        info!("Wallet already exists for user {}, skipping creation", user_id);
        return Ok(existing);
    }

    let addresses = generator.generate().await?;
    if let Err(e) = validate_addresses(&addresses) {
        warn!("Discarding unusable deposit addresses {:?}: {}", addresses, e);
        return Err(e);
    }

    let now = Utc::now();
    let wallet = wallet::ActiveModel {
        user_id: Set(user_id.to_string()),
        total_balance_usd: Set(0.0),
        btc_address: Set(addresses.btc.clone()),
        btc_balance: Set(0.0),
        usdt_trc20_address: Set(addresses.usdt_trc20.clone()),
        usdt_trc20_balance: Set(0.0),
        usdt_bep20_address: Set(addresses.usdt_bep20.clone()),
        usdt_bep20_balance: Set(0.0),
        version: Set(0),
        last_updated: Set(now),
        created_at: Set(now),
        ..Default::default()
    };

    match wallet.insert(db).await.map_err(Error::from) {
        Ok(created) => {
            info!("Created wallet {} for user {}", created.id, user_id);
            Ok(created)
        }
        Err(Error::Conflict { message }) => {
            warn!("Wallet insert conflicted for user {}: {}", user_id, message);
            match get_wallet_by_user(db, user_id).await? {
                // Lost the race to a concurrent bootstrap; the set was never used
                Some(existing) => {
                    generator.release(addresses).await;
                    Ok(existing)
                }
                None => {
                    warn!(
                        "Discarding deposit addresses {:?} that collide with another wallet",
                        addresses
                    );
                    Err(Error::Conflict { message })
                }
            }
        }
        Err(e) => {
            generator.release(addresses).await;
            Err(e)
        }
    }
}

fn validate_addresses(addresses: &DepositAddresses) -> Result<()> {
    let all = [
        &addresses.btc,
        &addresses.usdt_trc20,
        &addresses.usdt_bep20,
    ];
    if all.iter().any(|address| address.trim().is_empty()) {
        return Err(Error::Validation {
            message: "generated deposit address is empty".to_string(),
        });
    }
    let distinct: HashSet<&String> = all.into_iter().collect();
    if distinct.len() != 3 {
        return Err(Error::Validation {
            message: "generated deposit addresses are not distinct".to_string(),
        });
    }
    Ok(())
}

/// Atomically adds `amount` to the wallet balance.
pub async fn credit_balance<C>(db: &C, wallet_id: i64, amount: f64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Wallet::update_many()
        .col_expr(
            wallet::Column::TotalBalanceUsd,
            Expr::col(wallet::Column::TotalBalanceUsd).add(amount),
        )
        .col_expr(
            wallet::Column::Version,
            Expr::col(wallet::Column::Version).add(1),
        )
        .col_expr(wallet::Column::LastUpdated, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(wallet_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::WalletNotFound {
            user_id: format!("wallet #{wallet_id}"),
        });
    }
    Ok(())
}

/// Atomically subtracts `amount` from the wallet balance if the balance covers it.
///
/// The sufficiency check is part of the `UPDATE`, so two concurrent debits can never both
/// pass it against the same stale balance.
pub async fn debit_balance<C>(db: &C, wallet_id: i64, amount: f64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Wallet::update_many()
        .col_expr(
            wallet::Column::TotalBalanceUsd,
            Expr::col(wallet::Column::TotalBalanceUsd).sub(amount),
        )
        .col_expr(
            wallet::Column::Version,
            Expr::col(wallet::Column::Version).add(1),
        )
        .col_expr(wallet::Column::LastUpdated, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(wallet_id))
        .filter(wallet::Column::TotalBalanceUsd.gte(amount))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let current = Wallet::find_by_id(wallet_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::WalletNotFound {
                user_id: format!("wallet #{wallet_id}"),
            })?
            .total_balance_usd;
        return Err(Error::InsufficientFunds {
            current,
            required: amount,
        });
    }
    Ok(())
}

/// Atomically adds a deposit to both the matching sub-balance and the total balance.
pub async fn credit_deposit_balance<C>(
    db: &C,
    wallet_id: i64,
    network: Network,
    amount: f64,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let sub_balance = match network {
        Network::Btc => wallet::Column::BtcBalance,
        Network::Trc20 => wallet::Column::UsdtTrc20Balance,
        Network::Bep20 => wallet::Column::UsdtBep20Balance,
    };

    let result = Wallet::update_many()
        .col_expr(sub_balance, Expr::col(sub_balance).add(amount))
        .col_expr(
            wallet::Column::TotalBalanceUsd,
            Expr::col(wallet::Column::TotalBalanceUsd).add(amount),
        )
        .col_expr(
            wallet::Column::Version,
            Expr::col(wallet::Column::Version).add(1),
        )
        .col_expr(wallet::Column::LastUpdated, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(wallet_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::WalletNotFound {
            user_id: format!("wallet #{wallet_id}"),
        });
    }
    Ok(())
}

/// Balances and addresses for the user's wallet.
pub async fn get_wallet_summary<C>(db: &C, user_id: &str) -> Result<WalletSummary>
where
    C: ConnectionTrait,
{
    require_wallet(db, user_id).await.map(WalletSummary::from)
}

/// Lists every wallet's deposit addresses, grouped by network and per user.
pub async fn list_wallet_addresses<C>(db: &C) -> Result<AddressListing>
where
    C: ConnectionTrait,
{
    let wallets = Wallet::find()
        .order_by_asc(wallet::Column::Id)
        .all(db)
        .await?;

    let detailed: Vec<WalletAddresses> = wallets
        .into_iter()
        .map(|w| WalletAddresses {
            user_id: w.user_id,
            btc: w.btc_address,
            trc20: w.usdt_trc20_address,
            bep20: w.usdt_bep20_address,
        })
        .collect();

    let btc_addresses: Vec<String> = detailed.iter().map(|w| w.btc.clone()).collect();
    let trc20_addresses: Vec<String> = detailed.iter().map(|w| w.trc20.clone()).collect();
    let bep20_addresses: Vec<String> = detailed.iter().map(|w| w.bep20.clone()).collect();

    let count_unique = |addresses: &[String]| addresses.iter().collect::<HashSet<_>>().len();
    let unique_addresses = (
        count_unique(&btc_addresses),
        count_unique(&trc20_addresses),
        count_unique(&bep20_addresses),
    );

    Ok(AddressListing {
        total_wallets: detailed.len(),
        btc_addresses,
        trc20_addresses,
        bep20_addresses,
        detailed,
        unique_addresses,
    })
}
