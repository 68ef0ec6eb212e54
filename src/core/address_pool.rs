//! Address generator backed by a pre-provisioned pool of deposit addresses.
//!
//! Operators list address triples under `[[address_pool]]` in the settings file. Triples already
//! assigned to a wallet are skipped at start-up; the rest are handed out in file order.

use crate::{
    core::wallet::{self, AddressGenerator, DepositAddresses},
    errors::{Error, Result},
};
use async_trait::async_trait;
use sea_orm::ConnectionTrait;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Hands out configured address triples, each at most once.
#[derive(Debug, Default)]
pub struct PooledAddressGenerator {
    available: Mutex<VecDeque<DepositAddresses>>,
}

impl PooledAddressGenerator {
    /// Hands out `pool` in order, without checking for assigned addresses.
    #[must_use]
    pub fn new(pool: Vec<DepositAddresses>) -> Self {
        Self {
            available: Mutex::new(pool.into()),
        }
    }

    /// Builds the pool, dropping every triple that shares an address with an existing wallet.
    pub async fn excluding_assigned<C>(db: &C, pool: Vec<DepositAddresses>) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let listing = wallet::list_wallet_addresses(db).await?;
        let assigned: HashSet<String> = listing
            .btc_addresses
            .into_iter()
            .chain(listing.trc20_addresses)
            .chain(listing.bep20_addresses)
            .collect();

        let configured = pool.len();
        let fresh: Vec<DepositAddresses> = pool
            .into_iter()
            .filter(|entry| {
                ![&entry.btc, &entry.usdt_trc20, &entry.usdt_bep20]
                    .iter()
                    .any(|address| assigned.contains(*address))
            })
            .collect();

        info!(
            "Address pool: {} configured, {} unassigned",
            configured,
            fresh.len()
        );
        Ok(Self::new(fresh))
    }

    /// Triples not handed out yet.
    pub async fn remaining(&self) -> usize {
        self.available.lock().await.len()
    }
}

#[async_trait]
impl AddressGenerator for PooledAddressGenerator {
    async fn generate(&self) -> Result<DepositAddresses> {
        let mut available = self.available.lock().await;
        let next = available.pop_front().ok_or_else(|| Error::Config {
            message: "Deposit address pool is exhausted".to_string(),
        })?;
        if available.is_empty() {
            warn!("Deposit address pool is now empty");
        }
        Ok(next)
    }

    async fn release(&self, addresses: DepositAddresses) {
        info!("Returning unused deposit addresses {} to the pool", addresses.btc);
        self.available.lock().await.push_front(addresses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn triple(n: u32) -> DepositAddresses {
        DepositAddresses {
            btc: format!("bc1-{n}"),
            usdt_trc20: format!("T-{n}"),
            usdt_bep20: format!("0x{n}"),
        }
    }

    #[tokio::test]
    async fn test_pool_hands_out_in_order_then_exhausts() -> Result<()> {
        let pool = PooledAddressGenerator::new(vec![triple(1), triple(2)]);

        assert_eq!(pool.generate().await?, triple(1));
        assert_eq!(pool.generate().await?, triple(2));
        assert_eq!(pool.remaining().await, 0);
        assert!(matches!(
            pool.generate().await,
            Err(Error::Config { message: _ })
        ));
        Ok(())
    }

    /// Lets another bootstrap for the same user win between the existence check and the insert.
    struct RacedPool {
        db: std::sync::Arc<sea_orm::DatabaseConnection>,
        rival_user: &'static str,
        pool: PooledAddressGenerator,
    }

    #[async_trait]
    impl AddressGenerator for RacedPool {
        async fn generate(&self) -> Result<DepositAddresses> {
            bootstrap_test_wallet(&self.db, self.rival_user).await?;
            self.pool.generate().await
        }

        async fn release(&self, addresses: DepositAddresses) {
            self.pool.release(addresses).await;
        }
    }

    #[tokio::test]
    async fn test_lost_bootstrap_race_returns_addresses_to_pool() -> Result<()> {
        // DatabaseConnection is not Clone when sea-orm's `mock` feature is on
        let db = std::sync::Arc::new(setup_test_db().await?);
        let raced = RacedPool {
            db: db.clone(),
            rival_user: "user-1",
            pool: PooledAddressGenerator::new(vec![triple(1), triple(2)]),
        };

        let winner = wallet::bootstrap_wallet(&*db, "user-1", &raced).await?;
        assert_eq!(winner.btc_address, "btc-user-1");
        assert_eq!(raced.pool.remaining().await, 2);
        assert_eq!(raced.pool.generate().await?, triple(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_colliding_addresses_are_not_returned() -> Result<()> {
        let db = setup_test_db().await?;
        let first = PooledAddressGenerator::new(vec![triple(1)]);
        wallet::bootstrap_wallet(&db, "user-1", &first).await?;

        // Built without checking assignments, so it still holds the taken triple
        let pool = PooledAddressGenerator::new(vec![triple(1), triple(2)]);
        assert!(matches!(
            wallet::bootstrap_wallet(&db, "user-2", &pool).await,
            Err(Error::Conflict { message: _ })
        ));
        assert_eq!(pool.remaining().await, 1);

        let created = wallet::bootstrap_wallet(&db, "user-2", &pool).await?;
        assert_eq!(created.btc_address, "bc1-2");
        Ok(())
    }

    #[tokio::test]
    async fn test_pool_skips_assigned_addresses() -> Result<()> {
        let db = setup_test_db().await?;
        let first = PooledAddressGenerator::new(vec![triple(1)]);
        wallet::bootstrap_wallet(&db, "user-1", &first).await?;

        let pool =
            PooledAddressGenerator::excluding_assigned(&db, vec![triple(1), triple(2)]).await?;
        assert_eq!(pool.remaining().await, 1);

        let created = wallet::bootstrap_wallet(&db, "user-2", &pool).await?;
        assert_eq!(created.btc_address, "bc1-2");
        Ok(())
    }
}
