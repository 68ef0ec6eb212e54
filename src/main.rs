#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use game_ledger::{
    config::{database, settings},
    core::{address_pool::PooledAddressGenerator, deposit},
    engine::WalletEngine,
    errors::Result,
    telemetry::{self, Telemetry},
};
use std::{env, sync::Arc};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    telemetry::init_tracing();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load ledger settings (defaults if the file is missing)
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load ledger settings: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect(|_| info!("Database connection established."))
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Build the engine
    let addresses =
        PooledAddressGenerator::excluding_assigned(&db, settings.address_pool.clone()).await?;
    if addresses.remaining().await == 0 {
        warn!("No unassigned deposit addresses configured; new wallets cannot be bootstrapped");
    }
    let telemetry = Arc::new(Telemetry::new());
    let engine = WalletEngine::new(db, settings, Arc::clone(&telemetry), Arc::new(addresses));

    // 6. Apply a deposit batch from the watcher, if one was given
    let outcome = match env::args().nth(1) {
        Some(path) => ingest_deposit_file(&engine, &path).await,
        None => {
            info!("No deposit batch given, nothing to ingest.");
            Ok(())
        }
    };

    telemetry.flush();
    outcome
}

async fn ingest_deposit_file(engine: &WalletEngine, path: &str) -> Result<()> {
    let records = deposit::load_deposit_file(path)
        .inspect_err(|e| error!("Failed to read deposit batch {}: {}", path, e))?;

    let report = engine.apply_deposit_batch(&records).await?;
    for failure in &report.failures {
        warn!(
            "Deposit {} for user {} failed: {}",
            failure.tx_hash, failure.user_id, failure.reason
        );
    }
    info!(
        "Deposit batch {}: {}/{} processed, {} duplicates",
        path, report.processed, report.submitted, report.duplicates
    );
    Ok(())
}
