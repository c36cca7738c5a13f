//! End-to-end poll cycles against an in-memory SQLite store.
//!
//! Two polls of 50 coins: the first includes dogecoin, the second swaps
//! it for pepecoin.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use coinwatch::agent::tools::FetchTopCoinsTool;
use coinwatch::agent::Agent;
use coinwatch::engine::Poller;
use coinwatch::market::MarketDataSource;
use coinwatch::storage::{CoinStore, SqliteStore};
use coinwatch::types::CryptoRecord;

/// Serves one prepared batch per fetch.
struct ReplaySource {
    batches: Mutex<VecDeque<Vec<CryptoRecord>>>,
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn fetch_top_coins(&self, count: u32) -> Result<Vec<CryptoRecord>> {
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        Ok(batch.into_iter().take(count as usize).collect())
    }
}

fn coin(id: &str, price: Decimal) -> CryptoRecord {
    CryptoRecord::new(id, &id[..3], id, price)
}

fn batch(last: &str, last_price: Decimal, base_price: Decimal) -> Vec<CryptoRecord> {
    let mut coins: Vec<_> = (0..49).map(|i| coin(&format!("coin{i:02}"), base_price)).collect();
    coins.push(coin(last, last_price));
    coins
}

#[tokio::test]
async fn test_dogecoin_exits_and_pepecoin_enters() {
    let source = ReplaySource {
        batches: Mutex::new(VecDeque::from([
            batch("dogecoin", dec!(0.12), dec!(10)),
            batch("pepecoin", dec!(0.0000011), dec!(11)),
        ])),
    };
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let agent = Agent::direct(FetchTopCoinsTool::new(Arc::new(source), 50));
    let mut poller = Poller::new(agent, store.clone(), "Get the latest market data");

    let first = poller.run_cycle().await.unwrap();
    assert_eq!(first.fetched, 50);
    assert_eq!(first.upserted, 50);
    assert!(first.diff.is_empty());

    let second = poller.run_cycle().await.unwrap();
    assert_eq!(second.diff.entrants.iter().collect::<Vec<_>>(), vec!["pepecoin"]);
    assert_eq!(second.diff.exits.iter().collect::<Vec<_>>(), vec!["dogecoin"]);
    assert!(!second.diff.exits_suppressed);

    let rows = store.list_all().await.unwrap();
    assert_eq!(rows.len(), 51);

    let doge = rows.iter().find(|r| r.id == "dogecoin").unwrap();
    assert_eq!(doge.price_in_usd, dec!(0.12));

    let pepe = store.get_by_symbol("pep").await.unwrap().unwrap();
    assert_eq!(pepe.id, "pepecoin");
    assert_eq!(pepe.price_in_usd, dec!(0.0000011));

    let coin0 = rows.iter().find(|r| r.id == "coin00").unwrap();
    assert_eq!(coin0.price_in_usd, dec!(11));
}

#[tokio::test]
async fn test_short_poll_reports_no_exits() {
    let mut short = batch("dogecoin", dec!(0.12), dec!(10));
    short.truncate(10);
    let source = ReplaySource {
        batches: Mutex::new(VecDeque::from([batch("dogecoin", dec!(0.12), dec!(10)), short])),
    };
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let agent = Agent::direct(FetchTopCoinsTool::new(Arc::new(source), 50));
    let mut poller = Poller::new(agent, store, "go");

    poller.run_cycle().await.unwrap();
    let second = poller.run_cycle().await.unwrap();
    assert_eq!(second.fetched, 10);
    assert!(second.diff.exits.is_empty());
    assert!(second.diff.exits_suppressed);
}
