//! Database CLI subcommands for boursed.
//!
//! Provides `db migrate`, `db status`, and `db seed` commands.

use anyhow::{anyhow, Result};
use std::env;
use tracing::info;

use bourse_db::{migrate, seed_demo_data, status};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `boursed db migrate` - Run pending migrations
/// - `boursed db status` - Check migration status and row counts
/// - `boursed db seed` - Insert demo users, investments and a holding
pub async fn run_db_command(args: Vec<String>) -> Result<()> {
    if args.len() < 3 {
        return Err(anyhow!("Usage: boursed db <migrate|status|seed>"));
    }

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match args[2].as_str() {
        "migrate" => {
            migrate(&pool).await?;
        },
        "status" => {
            status(&pool).await?;
        },
        "seed" => {
            let summary = seed_demo_data(&pool).await?;
            info!(
                "Seeded: buyer={}, seller={}, ACME={}, BTC={}",
                summary.buyer_id, summary.seller_id, summary.stock_id, summary.crypto_id
            );
        },
        _ => {
            return Err(anyhow!("Unknown db command: {}. Use migrate, status, or seed", args[2]));
        },
    }

    Ok(())
}
