//! Transaction history queries.

use crate::{
    config::settings::HistorySettings,
    core::wallet,
    entities::{Asset, GameName, Network, TransactionType, WalletTransaction, wallet_transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, QueryTrait, Select, prelude::*};
use serde::{Deserialize, Serialize};

/// Optional filters and paging for [`get_transaction_history`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionFilter {
    /// Entry kind
    pub tx_type: Option<TransactionType>,
    /// Deposit or withdrawal asset
    pub asset: Option<Asset>,
    /// Deposit or withdrawal network
    pub network: Option<Network>,
    /// Game of credit and redeem entries
    pub game_name: Option<GameName>,
    /// Inclusive lower bound on the entry timestamp
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry timestamp
    pub end: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size
    pub limit: Option<u64>,
}

/// Page position of a history result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Entries matching the filter
    pub total: u64,
    /// 1-based page returned
    pub page: u64,
    /// Page size after clamping
    pub limit: u64,
    /// Pages needed to cover `total`
    pub total_pages: u64,
}

/// Aggregates over every entry matching the filter, not just the returned page.
///
/// Sums are signed, so game credits and withdrawals total to negative values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Number of matching entries
    pub total_transactions: u64,
    /// Sum of deposit amounts
    pub total_deposits: f64,
    /// Sum of game credit amounts
    pub total_game_credits: f64,
    /// Sum of external withdrawal amounts
    pub total_withdrawals: f64,
}

/// One page of a wallet's history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionHistory {
    /// Entries on this page
    pub transactions: Vec<wallet_transaction::Model>,
    /// Where this page sits in the result
    pub pagination: Pagination,
    /// Aggregates over the whole result
    pub stats: HistoryStats,
}

impl TransactionFilter {
    /// Resolves `(page, limit)`, defaulting and clamping against `settings`.
    #[must_use]
    pub fn page_request(&self, settings: &HistorySettings) -> (u64, u64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(settings.default_page_size)
            .min(settings.max_page_size)
            .max(1);
        (page, limit)
    }

    /// Checks the date range and resolves the page request, rejecting pages whose row offset
    /// does not fit an SQL `OFFSET`.
    fn validate(&self, settings: &HistorySettings) -> Result<(u64, u64)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                return Err(Error::Validation {
                    message: format!("History start {start} is after end {end}"),
                });
            }
            _ => {}
        }

        let (page, limit) = self.page_request(settings);
        (page - 1)
            .checked_mul(limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| Error::Validation {
                message: format!("History page {page} is out of range for page size {limit}"),
            })?;
        Ok((page, limit))
    }

    fn apply(&self, wallet_id: i64) -> Select<WalletTransaction> {
        WalletTransaction::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
            .apply_if(self.tx_type, |q, v| {
                q.filter(wallet_transaction::Column::TxType.eq(v))
            })
            .apply_if(self.asset, |q, v| {
                q.filter(wallet_transaction::Column::Asset.eq(v))
            })
            .apply_if(self.network, |q, v| {
                q.filter(wallet_transaction::Column::Network.eq(v))
            })
            .apply_if(self.game_name, |q, v| {
                q.filter(wallet_transaction::Column::GameName.eq(v))
            })
            .apply_if(self.start, |q, v| {
                q.filter(wallet_transaction::Column::Timestamp.gte(v))
            })
            .apply_if(self.end, |q, v| {
                q.filter(wallet_transaction::Column::Timestamp.lte(v))
            })
    }
}

/// Filtered, paginated history of the user's wallet with aggregate stats.
pub async fn get_transaction_history<C>(
    db: &C,
    user_id: &str,
    filter: &TransactionFilter,
    settings: &HistorySettings,
) -> Result<TransactionHistory>
where
    C: ConnectionTrait,
{
    let (page, limit) = filter.validate(settings)?;
    let holder = wallet::require_wallet(db, user_id).await?;

    let amounts: Vec<(TransactionType, f64)> = filter
        .apply(holder.id)
        .select_only()
        .column(wallet_transaction::Column::TxType)
        .column(wallet_transaction::Column::Amount)
        .into_tuple()
        .all(db)
        .await?;

    let sum_of = |kind: TransactionType| -> f64 {
        amounts
            .iter()
            .filter(|(tx_type, _)| *tx_type == kind)
            .map(|(_, amount)| amount)
            .sum()
    };
    let total = amounts.len() as u64;
    let stats = HistoryStats {
        total_transactions: total,
        total_deposits: sum_of(TransactionType::Deposit),
        total_game_credits: sum_of(TransactionType::GameCredit),
        total_withdrawals: sum_of(TransactionType::Withdrawal),
    };

    let transactions = filter
        .apply(holder.id)
        .order_by_desc(wallet_transaction::Column::Timestamp)
        .order_by_desc(wallet_transaction::Column::Id)
        .paginate(db, limit)
        .fetch_page(page - 1)
        .await?;

    Ok(TransactionHistory {
        transactions,
        pagination: Pagination {
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        },
        stats,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{
        core::{credit, deposit::DepositRecord, deposit::apply_deposit, withdrawal},
        test_utils::*,
    };
    use chrono::Duration;

    fn settings() -> HistorySettings {
        HistorySettings {
            default_page_size: 50,
            max_page_size: 100,
        }
    }

    /// Deposit 100 BTC-side and 50 TRC20, credit 30 to Juwa, withdraw 20.
    async fn seed_history() -> Result<sea_orm::DatabaseConnection> {
        let (db, _) = setup_player("user-1", GameName::Juwa, 100.0).await?;
        apply_deposit(
            &db,
            &DepositRecord {
                user_id: "user-1".to_string(),
                tx_hash: "0xtrc".to_string(),
                amount: 50.0,
                asset: Asset::Usdt,
                network: Some(Network::Trc20),
            },
        )
        .await?;
        credit::request_credit(&db, "user-1", GameName::Juwa, 30.0).await?;
        withdrawal::initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 20.0).await?;
        Ok(db)
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        let settings = settings();
        assert_eq!(TransactionFilter::default().page_request(&settings), (1, 50));

        let filter = TransactionFilter {
            page: Some(0),
            limit: Some(10_000),
            ..TransactionFilter::default()
        };
        assert_eq!(filter.page_request(&settings), (1, 100));

        let filter = TransactionFilter {
            page: Some(3),
            limit: Some(5),
            ..TransactionFilter::default()
        };
        assert_eq!(filter.page_request(&settings), (3, 5));
    }

    #[tokio::test]
    async fn test_history_newest_first_with_stats() -> Result<()> {
        let db = seed_history().await?;

        let history =
            get_transaction_history(&db, "user-1", &TransactionFilter::default(), &settings())
                .await?;

        let kinds: Vec<TransactionType> = history.transactions.iter().map(|t| t.tx_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Withdrawal,
                TransactionType::GameCredit,
                TransactionType::Deposit,
                TransactionType::Deposit,
            ]
        );
        assert_eq!(history.pagination.total, 4);
        assert_eq!(history.pagination.total_pages, 1);
        assert_eq!(history.stats.total_transactions, 4);
        assert_eq!(history.stats.total_deposits, 150.0);
        assert_eq!(history.stats.total_game_credits, -30.0);
        assert_eq!(history.stats.total_withdrawals, -20.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_filters() -> Result<()> {
        let db = seed_history().await?;

        let deposits = TransactionFilter {
            tx_type: Some(TransactionType::Deposit),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &deposits, &settings()).await?;
        assert_eq!(history.stats.total_transactions, 2);
        assert_eq!(history.stats.total_game_credits, 0.0);

        let trc20 = TransactionFilter {
            network: Some(Network::Trc20),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &trc20, &settings()).await?;
        assert_eq!(history.transactions.len(), 1);
        assert_eq!(history.transactions[0].tx_hash.as_deref(), Some("0xtrc"));

        let juwa = TransactionFilter {
            game_name: Some(GameName::Juwa),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &juwa, &settings()).await?;
        assert_eq!(history.transactions.len(), 1);
        assert_eq!(history.transactions[0].tx_type, TransactionType::GameCredit);

        let future = TransactionFilter {
            start: Some(Utc::now() + Duration::hours(1)),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &future, &settings()).await?;
        assert!(history.transactions.is_empty());
        assert_eq!(history.pagination.total_pages, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_pagination() -> Result<()> {
        let db = seed_history().await?;

        let filter = TransactionFilter {
            page: Some(2),
            limit: Some(3),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &filter, &settings()).await?;
        assert_eq!(history.transactions.len(), 1);
        assert_eq!(history.transactions[0].tx_type, TransactionType::Deposit);
        assert_eq!(history.pagination.total_pages, 2);
        // Stats always cover the whole filtered set
        assert_eq!(history.stats.total_transactions, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_rejects_page_beyond_offset_range() -> Result<()> {
        let db = seed_history().await?;

        let huge = TransactionFilter {
            page: Some(u64::MAX),
            ..TransactionFilter::default()
        };
        assert!(matches!(
            get_transaction_history(&db, "user-1", &huge, &HistorySettings::default()).await,
            Err(Error::Validation { message: _ })
        ));

        let far = TransactionFilter {
            page: Some(1_000_000),
            limit: Some(50),
            ..TransactionFilter::default()
        };
        let history = get_transaction_history(&db, "user-1", &far, &settings()).await?;
        assert!(history.transactions.is_empty());
        assert_eq!(history.pagination.total, 4);
        Ok(())
    }

    #[test]
    fn test_validate_offset_boundary() {
        let max_offset = u64::try_from(i64::MAX).unwrap();
        let fits = TransactionFilter {
            page: Some(max_offset / 50 + 1),
            limit: Some(50),
            ..TransactionFilter::default()
        };
        assert_eq!(fits.validate(&settings()).unwrap(), (max_offset / 50 + 1, 50));

        let past = TransactionFilter {
            page: Some(max_offset / 50 + 2),
            ..fits
        };
        assert!(matches!(
            past.validate(&settings()),
            Err(Error::Validation { message: _ })
        ));
    }

    #[tokio::test]
    async fn test_history_zero_page_sizes_fall_back_to_one() -> Result<()> {
        let db = seed_history().await?;
        let degenerate = HistorySettings {
            default_page_size: 0,
            max_page_size: 0,
        };

        let history =
            get_transaction_history(&db, "user-1", &TransactionFilter::default(), &degenerate)
                .await?;
        assert_eq!(history.pagination.limit, 1);
        assert_eq!(history.pagination.total_pages, 4);
        assert_eq!(history.transactions.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_rejects_inverted_range_and_missing_wallet() -> Result<()> {
        let db = seed_history().await?;
        let now = Utc::now();

        let inverted = TransactionFilter {
            start: Some(now),
            end: Some(now - Duration::days(1)),
            ..TransactionFilter::default()
        };
        assert!(matches!(
            get_transaction_history(&db, "user-1", &inverted, &settings()).await,
            Err(Error::Validation { message: _ })
        ));
        assert!(matches!(
            get_transaction_history(&db, "nobody", &TransactionFilter::default(), &settings())
                .await,
            Err(Error::WalletNotFound { user_id: _ })
        ));
        Ok(())
    }
}
