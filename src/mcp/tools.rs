//! The five CRUD tools exposed over MCP.
//!
//! Argument errors and unknown tool names surface as `Validation` /
//! `NotFound` errors so the server can answer with -32602. Store errors
//! pass through unchanged and become `isError` tool results.

use anyhow::Result;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::storage::CoinStore;
use crate::types::{CoinwatchError, CryptoRecord};

pub const GET_ALL: &str = "get_all_cryptocurrencies";
pub const GET_BY_SYMBOL: &str = "get_cryptocurrency_by_symbol";
pub const ADD: &str = "add_cryptocurrency";
pub const UPDATE_PRICE: &str = "update_cryptocurrency_price";
pub const DELETE: &str = "delete_cryptocurrency";

/// Tool descriptors for `tools/list`.
pub fn definitions() -> Vec<Value> {
    let symbol_only = json!({
        "type": "object",
        "properties": {
            "symbol": { "type": "string", "description": "Ticker symbol, e.g. BTC" }
        },
        "required": ["symbol"]
    });

    vec![
        json!({
            "name": GET_ALL,
            "description": "Retrieve all cryptocurrency records from the database.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": GET_BY_SYMBOL,
            "description": "Retrieve one cryptocurrency record by its symbol.",
            "inputSchema": symbol_only.clone()
        }),
        json!({
            "name": ADD,
            "description": "Add a new cryptocurrency record.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Unique identifier, e.g. bitcoin" },
                    "symbol": { "type": "string" },
                    "name": { "type": "string" },
                    "price_in_usd": { "type": "number" }
                },
                "required": ["id", "symbol", "name", "price_in_usd"]
            }
        }),
        json!({
            "name": UPDATE_PRICE,
            "description": "Update the USD price of a cryptocurrency by its symbol.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "symbol": { "type": "string" },
                    "new_price": { "type": "number" }
                },
                "required": ["symbol", "new_price"]
            }
        }),
        json!({
            "name": DELETE,
            "description": "Delete a cryptocurrency record by its symbol.",
            "inputSchema": symbol_only
        }),
    ]
}

fn string_arg(args: &Map<String, Value>, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(CoinwatchError::Validation(format!("`{key}` must be a non-empty string")).into()),
    }
}

fn price_arg(args: &Map<String, Value>, key: &str) -> Result<Decimal> {
    let invalid = || CoinwatchError::Validation(format!("`{key}` must be a number"));
    match args.get(key) {
        Some(v @ Value::Number(_)) => {
            Ok(serde_json::from_value::<Decimal>(v.clone()).map_err(|_| invalid())?)
        }
        _ => Err(invalid().into()),
    }
}

/// Run the named tool against `store`.
pub async fn call(store: &dyn CoinStore, name: &str, args: &Map<String, Value>) -> Result<Value> {
    info!(tool = name, "Tool called");

    match name {
        GET_ALL => Ok(json!(store.list_all().await?)),

        GET_BY_SYMBOL => {
            let symbol = string_arg(args, "symbol")?;
            Ok(json!(store.get_by_symbol(&symbol).await?))
        }

        ADD => {
            let record = CryptoRecord::new(
                string_arg(args, "id")?,
                &string_arg(args, "symbol")?,
                string_arg(args, "name")?,
                price_arg(args, "price_in_usd")?,
            );
            Ok(json!(store.insert(&record).await?))
        }

        UPDATE_PRICE => {
            let symbol = string_arg(args, "symbol")?;
            let price = price_arg(args, "new_price")?;
            Ok(json!(store.update_price(&symbol, price).await?))
        }

        DELETE => {
            let symbol = string_arg(args, "symbol")?;
            Ok(match store.delete_by_symbol(&symbol).await? {
                Some(deleted) => json!({
                    "status": format!("Successfully deleted {symbol}"),
                    "deleted_record": deleted,
                }),
                None => json!({
                    "status": format!("Error: Cryptocurrency with symbol '{symbol}' not found."),
                }),
            })
        }

        other => Err(CoinwatchError::NotFound(format!("unknown tool `{other}`")).into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockCoinStore, SqliteStore};
    use crate::types::error_category;
    use rust_decimal_macros::dec;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_five_tools_with_schemas() {
        let defs = definitions();
        let names: Vec<_> = defs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec![GET_ALL, GET_BY_SYMBOL, ADD, UPDATE_PRICE, DELETE]);
        assert!(defs.iter().all(|d| d["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_missing_symbol_returns_null() {
        let store = SqliteStore::in_memory().await.unwrap();
        let out = call(&store, GET_BY_SYMBOL, &args(json!({"symbol": "NOPE"}))).await.unwrap();
        assert!(out.is_null());
    }

    #[tokio::test]
    async fn test_add_normalises_symbol_and_keeps_price() {
        let store = SqliteStore::in_memory().await.unwrap();
        let out = call(
            &store,
            ADD,
            &args(json!({"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "price_in_usd": 65000.5})),
        )
        .await
        .unwrap();
        assert_eq!(out["symbol"], "BTC");
        let row = store.get_by_symbol("BTC").await.unwrap().unwrap();
        assert_eq!(row.price_in_usd, dec!(65000.5));
    }

    #[tokio::test]
    async fn test_delete_missing_reports_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        let out = call(&store, DELETE, &args(json!({"symbol": "xyz"}))).await.unwrap();
        assert_eq!(out["status"], "Error: Cryptocurrency with symbol 'xyz' not found.");
        assert!(out.get("deleted_record").is_none());
    }

    #[tokio::test]
    async fn test_delete_status_echoes_caller_symbol() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert(&CryptoRecord::new("dogecoin", "DOGE", "Dogecoin", dec!(0.12)))
            .await
            .unwrap();
        let out = call(&store, DELETE, &args(json!({"symbol": "doge"}))).await.unwrap();
        assert_eq!(out["status"], "Successfully deleted doge");
        assert_eq!(out["deleted_record"]["symbol"], "DOGE");
    }

    #[tokio::test]
    async fn test_bad_arguments_are_validation_errors() {
        let store = MockCoinStore::new();
        let err = call(&store, UPDATE_PRICE, &args(json!({"symbol": "BTC", "new_price": "cheap"})))
            .await
            .unwrap_err();
        assert_eq!(error_category(&err), "validation");

        let err = call(&store, GET_BY_SYMBOL, &args(json!({"symbol": "  "}))).await.unwrap_err();
        assert_eq!(error_category(&err), "validation");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let store = MockCoinStore::new();
        let err = call(&store, "drop_table", &Map::new()).await.unwrap_err();
        assert_eq!(error_category(&err), "not_found");
    }

    #[tokio::test]
    async fn test_store_error_passes_through() {
        let mut store = MockCoinStore::new();
        store
            .expect_list_all()
            .returning(|| Err(CoinwatchError::Database("HTTP 500".into()).into()));
        let err = call(&store, GET_ALL, &Map::new()).await.unwrap_err();
        assert_eq!(error_category(&err), "database");
    }
}
