//! Bourse Daemon
//!
//! Runs the batch matching scheduler over the ledger store.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p boursed
//!
//! # Order-to-order matching, pass every 10 seconds
//! BOURSE_MATCHING_MODE=order_to_order BOURSE_BATCH_INTERVAL_SECS=10 cargo run -p boursed
//!
//! # PostgreSQL
//! DATABASE_URL=postgres://... cargo run -p boursed --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `BOURSE_ENV`: Environment (test, development, production)
//! - `BOURSE_MATCHING_MODE`: inventory (default) or order_to_order
//! - `BOURSE_EQUAL_POLICY`: at_or_above (default) or exact
//! - `BOURSE_BATCH_INTERVAL_SECS`: Seconds between passes (default: 30, 0 disables)
//! - `BOURSE_EVENT_BUS_CAPACITY`: Event bus buffer (default: 1000)
//! - `BOURSE_LOG_JSON`: Emit JSON logs when set to 1
//! - `DATABASE_URL`: PostgreSQL connection string (feature `postgres`)

use boursed::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("boursed=info".parse()?);
    if config.log_json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        return run_db(args).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        mode = config.matching.mode.as_str(),
        batch_interval_secs = config.batch.interval_secs,
        "Bourse daemon"
    );

    run_daemon(config).await
}

#[cfg(feature = "postgres")]
async fn run_db(args: Vec<String>) -> anyhow::Result<()> {
    boursed::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: Vec<String>) -> anyhow::Result<()> {
    anyhow::bail!("db commands require the `postgres` feature")
}

#[cfg(feature = "postgres")]
async fn run_daemon(config: Config) -> anyhow::Result<()> {
    if let Some(database_url) = config.database_url.clone() {
        let daemon = Daemon::connect(config, &database_url).await?;
        daemon.run().await?;
        return Ok(());
    }
    Daemon::new_stub(config).run().await?;
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn run_daemon(config: Config) -> anyhow::Result<()> {
    Daemon::new_stub(config).run().await?;
    Ok(())
}
