//! Database lifecycle management for the bourse ledger.
//!
//! Provides migration running, status checking, and demo data seeding.

mod seed;

pub use seed::{seed_demo_data, SeedSummary};

use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// Result type for DB operations.
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Run all pending migrations.
///
/// Uses sqlx migrations from the workspace `migrations` directory.
/// Idempotent: safe to run multiple times.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("../migrations").run(pool).await?;

    info!("Migrations completed successfully");
    Ok(())
}

/// Check database connectivity, migration status and ledger row counts.
pub async fn status(pool: &PgPool) -> Result<()> {
    let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    if result != 1 {
        return Err(anyhow::anyhow!("Database connectivity check failed"));
    }
    info!("Database connectivity: OK");

    // Runtime query; sqlx::query! would need a database at compile time
    let rows = sqlx::query(
        r#"
        SELECT version, description, success
        FROM _sqlx_migrations
        ORDER BY version DESC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(migs) if !migs.is_empty() => {
            info!("Latest migrations:");
            for mig in migs {
                let version: i64 = mig.get("version");
                let description: String = mig.get("description");
                let success: bool = mig.get("success");
                let status = if success { "ok" } else { "FAILED" };
                info!("  v{} {}: {}", version, description, status);
            }
        },
        Ok(_) => {
            warn!("No migrations found in database (run `boursed db migrate` first)");
            return Ok(());
        },
        Err(e) => {
            // Table might not exist yet
            if e.to_string().contains("_sqlx_migrations") {
                warn!("Migration table not found (run `boursed db migrate` first)");
                return Ok(());
            }
            return Err(e.into());
        },
    }

    for table in ["users", "investments", "portfolios", "orders", "trades"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        info!("  {}: {} rows", table, count);
    }

    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'active'")
            .fetch_one(pool)
            .await?;
    info!("Active orders: {}", active);

    Ok(())
}
