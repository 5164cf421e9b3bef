//! Demo data for local development.
//!
//! Two users, two investments and one starting holding. Re-running the seed
//! leaves existing rows untouched and returns their ids.

use bourse_domain::InvestmentKind;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::Result;

/// Ids of the seeded rows.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub stock_id: Uuid,
    pub crypto_id: Uuid,
    pub seller_portfolio_id: Uuid,
}

/// Seed the demo ledger.
///
/// Uses INSERT ... ON CONFLICT DO NOTHING for idempotency.
pub async fn seed_demo_data(pool: &PgPool) -> Result<SeedSummary> {
    let mut tx = pool.begin().await?;

    let buyer_id = upsert_user(&mut tx, "buyer@bourse.local", Decimal::new(10_000, 0)).await?;
    let seller_id = upsert_user(&mut tx, "seller@bourse.local", Decimal::new(500, 0)).await?;
    let stock_id =
        upsert_investment(&mut tx, "ACME", InvestmentKind::Stock, Decimal::new(100, 0), 1_000)
            .await?;
    let crypto_id = upsert_investment(
        &mut tx,
        "BTC",
        InvestmentKind::Cryptocurrency,
        Decimal::new(30_000, 0),
        10,
    )
    .await?;

    sqlx::query(
        r#"
        INSERT INTO portfolios (id, owner_id, investment_id, held_quantity, reserved_quantity, cost_basis)
        VALUES ($1, $2, $3, 20, 0, 2000)
        ON CONFLICT (owner_id, investment_id) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(seller_id)
    .bind(stock_id)
    .execute(&mut *tx)
    .await?;

    let seller_portfolio_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM portfolios WHERE owner_id = $1 AND investment_id = $2",
    )
    .bind(seller_id)
    .bind(stock_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let summary = SeedSummary { buyer_id, seller_id, stock_id, crypto_id, seller_portfolio_id };
    info!(?summary, "Demo data seeded");
    Ok(summary)
}

async fn upsert_user(
    tx: &mut Transaction<'static, Postgres>,
    email: &str,
    balance: Decimal,
) -> Result<Uuid> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, balance)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(balance)
    .execute(&mut **tx)
    .await?;

    let id = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

async fn upsert_investment(
    tx: &mut Transaction<'static, Postgres>,
    name: &str,
    kind: InvestmentKind,
    reference_price: Decimal,
    available_quantity: i64,
) -> Result<Uuid> {
    sqlx::query(
        r#"
        INSERT INTO investments (id, name, kind, reference_price, available_quantity)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .bind(kind.as_str())
    .bind(reference_price)
    .bind(available_quantity)
    .execute(&mut **tx)
    .await?;

    let id = sqlx::query_scalar("SELECT id FROM investments WHERE name = $1")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../migrations")]
    async fn test_seed_is_idempotent(pool: PgPool) {
        let first = seed_demo_data(&pool).await.unwrap();
        let second = seed_demo_data(&pool).await.unwrap();

        assert_eq!(first.buyer_id, second.buyer_id);
        assert_eq!(first.seller_portfolio_id, second.seller_portfolio_id);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 2);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_status_after_migrations(pool: PgPool) {
        crate::status(&pool).await.unwrap();
    }
}
