//! Shared ledger fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bourse_domain::{Investment, InvestmentKind, Portfolio, Price, User};
use bourse_store::{MemoryStore, Store};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub async fn user(store: &MemoryStore, balance: Decimal) -> User {
    let user = User::new(format!("{}@example.com", Uuid::now_v7()), balance).unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.save_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    user
}

pub async fn investment(store: &MemoryStore, price: Decimal, available: u64) -> Investment {
    let name = format!("INV-{}", Uuid::now_v7().simple());
    let investment =
        Investment::new(name, InvestmentKind::Stock, Price::new(price).unwrap(), available);
    let mut tx = store.begin().await.unwrap();
    tx.save_investment(&investment).await.unwrap();
    tx.commit().await.unwrap();
    investment
}

pub async fn holding(
    store: &MemoryStore,
    owner: &User,
    investment: &Investment,
    held: u64,
) -> Portfolio {
    let mut portfolio = Portfolio::new(owner.id, investment.id);
    portfolio.held_quantity = held;
    let mut tx = store.begin().await.unwrap();
    tx.save_portfolio(&portfolio).await.unwrap();
    tx.commit().await.unwrap();
    portfolio
}

pub async fn balance(store: &MemoryStore, user: &User) -> Decimal {
    store.find_user(user.id).await.unwrap().unwrap().balance
}

pub async fn available(store: &MemoryStore, investment: &Investment) -> u64 {
    store.find_investment(investment.id).await.unwrap().unwrap().available_quantity
}

pub async fn portfolio_of(store: &MemoryStore, owner: &User, investment: &Investment) -> Portfolio {
    store.find_portfolio_for(owner.id, investment.id).await.unwrap().unwrap()
}
