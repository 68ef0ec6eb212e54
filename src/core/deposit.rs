//! Deposit ingestion from the on-chain watcher.
//!
//! A deposit is identified by its chain `tx_hash`; applying the same hash twice to a wallet is a
//! successful no-op. Batches apply each record in its own unit of work and keep going past
//! failures.

use crate::{
    core::{
        transaction::{self, NewTransaction},
        unit_of_work, wallet,
    },
    entities::{Asset, Network, TransactionStatus, TransactionType, wallet_transaction},
    errors::{Error, Result},
};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// One confirmed deposit reported by the watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    /// Owner of the receiving wallet
    pub user_id: String,
    /// On-chain transaction hash, unique per wallet
    pub tx_hash: String,
    /// USD value credited to the wallet
    pub amount: f64,
    /// Deposited asset
    pub asset: Asset,
    /// Required for USDT, implied for BTC
    #[serde(default)]
    pub network: Option<Network>,
}

/// What [`apply_deposit`] did with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    /// Balance credited and entry appended
    Applied(wallet_transaction::Model),
    /// The hash was already recorded on this wallet
    AlreadyApplied {
        /// Hash of the repeated deposit
        tx_hash: String,
    },
}

/// A batch record that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Owner named by the record
    pub user_id: String,
    /// Hash named by the record
    pub tx_hash: String,
    /// Error message
    pub reason: String,
}

/// Summary of a deposit batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records received
    pub submitted: usize,
    /// Records that credited a wallet
    pub processed: usize,
    /// Records skipped because their hash was already applied
    pub duplicates: usize,
    /// Records rejected, with the reason
    pub failures: Vec<BatchFailure>,
}

/// Credits a single deposit unless its hash was already applied to the wallet.
#[instrument(skip(db, record), fields(user_id = %record.user_id, tx_hash = %record.tx_hash))]
pub async fn apply_deposit<C>(db: &C, record: &DepositRecord) -> Result<DepositOutcome>
where
    C: TransactionTrait,
{
    wallet::validate_amount(record.amount)?;
    let network = wallet::resolve_network(record.asset, record.network)?;
    let tx_hash = record.tx_hash.trim().to_string();
    if tx_hash.is_empty() {
        return Err(Error::Validation {
            message: "Deposit tx_hash is required".to_string(),
        });
    }

    let user_id = record.user_id.clone();
    let asset = record.asset;
    let amount = record.amount;
    let hash = tx_hash.clone();

    let outcome = unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let holder = wallet::require_wallet(txn, &user_id).await?;
            if transaction::find_deposit_by_hash(txn, holder.id, &hash)
                .await?
                .is_some()
            {
                return Ok(DepositOutcome::AlreadyApplied { tx_hash: hash });
            }

            wallet::credit_deposit_balance(txn, holder.id, network, amount).await?;
            let entry = transaction::append_transaction(
                txn,
                holder.id,
                NewTransaction::new(
                    TransactionType::Deposit,
                    amount,
                    TransactionStatus::Completed,
                    format!("Deposit of {amount} {asset} ({network})"),
                )
                .with_asset(asset, network)
                .with_tx_hash(hash),
            )
            .await?;

            Ok(DepositOutcome::Applied(entry))
        })
    })
    .await;

    match outcome {
        Ok(DepositOutcome::Applied(entry)) => {
            info!("Deposit of {} {} credited", amount, asset);
            Ok(DepositOutcome::Applied(entry))
        }
        Ok(already @ DepositOutcome::AlreadyApplied { .. }) => {
            debug!("Deposit already applied, skipping");
            Ok(already)
        }
        // A concurrent ingest of the same hash won the insert
        Err(Error::Conflict { .. }) => Ok(DepositOutcome::AlreadyApplied { tx_hash }),
        Err(e) => Err(e),
    }
}

/// Applies every record independently and reports what happened to each.
///
/// Fails as a whole only when the batch is empty or larger than `max_batch_size`.
#[instrument(skip(db, records), fields(submitted = records.len()))]
pub async fn apply_deposit_batch<C>(
    db: &C,
    records: &[DepositRecord],
    max_batch_size: usize,
) -> Result<BatchReport>
where
    C: TransactionTrait,
{
    if records.is_empty() {
        return Err(Error::Validation {
            message: "Deposit batch is empty".to_string(),
        });
    }
    if records.len() > max_batch_size {
        return Err(Error::Validation {
            message: format!(
                "Deposit batch of {} exceeds the maximum of {}",
                records.len(),
                max_batch_size
            ),
        });
    }

    let mut report = BatchReport {
        submitted: records.len(),
        ..BatchReport::default()
    };

    for record in records {
        match apply_deposit(db, record).await {
            Ok(DepositOutcome::Applied(_)) => report.processed += 1,
            Ok(DepositOutcome::AlreadyApplied { .. }) => report.duplicates += 1,
            Err(e) => {
                warn!(
                    "Skipping deposit {} for user {}: {}",
                    record.tx_hash, record.user_id, e
                );
                report.failures.push(BatchFailure {
                    user_id: record.user_id.clone(),
                    tx_hash: record.tx_hash.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Processed {}/{} deposits ({} duplicates, {} failed)",
        report.processed,
        report.submitted,
        report.duplicates,
        report.failures.len()
    );
    Ok(report)
}

/// Parses a JSON array of deposit records.
pub fn parse_deposit_records(json: &str) -> Result<Vec<DepositRecord>> {
    serde_json::from_str(json).map_err(|e| Error::Validation {
        message: format!("Malformed deposit batch: {e}"),
    })
}

/// Reads a JSON deposit batch from disk.
pub fn load_deposit_file(path: impl AsRef<Path>) -> Result<Vec<DepositRecord>> {
    let contents = std::fs::read_to_string(path)?;
    parse_deposit_records(&contents)
}
