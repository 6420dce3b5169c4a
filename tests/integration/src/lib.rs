//! End-to-end tests for the query layer over the in-memory store.
//!
//! Every test stands up its own [`MemoryStore`], creates a table, and drives
//! it through [`Table`], so the whole stack runs in process: expression
//! generation, the paginating request engine, cursor tokens, the store's
//! expression evaluator, and typed key ordering. Nothing here talks to a
//! network.

use std::sync::{Arc, Once};

use dynopage_core::{IndexKeys, Record, Schema, StoreClient, Table, Value};
use dynopage_mem::{IndexDef, MemoryStore, TableDef};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Stand up an in-memory store with one table shaped the way the tests
/// expect: "namespace" partition, "id" sort, and a "byOwner" index over
/// owner/id. Returns the store alongside the bound table so tests can reach
/// past the facade (failure injection, direct wire calls).
#[must_use]
pub fn make_table(prefix: &str) -> (Arc<MemoryStore>, Table) {
    init_tracing();
    let name = test_table_name(prefix);
    let store = Arc::new(MemoryStore::new());
    store
        .create_table(
            TableDef::new(name.clone())
                .with_partition("namespace")
                .with_sort("id")
                .with_index(IndexDef::new("byOwner", "owner").with_sort("id")),
        )
        .unwrap_or_else(|e| panic!("failed to create table {name}: {e}"));
    let client: Arc<dyn StoreClient> = store.clone();
    let table = Table::builder()
        .client(client)
        .name(name.as_str())
        .schema(
            Schema::new("namespace")
                .with_sort("id")
                .with_index("byOwner", IndexKeys::new("owner").with_sort("id")),
        )
        .build()
        .unwrap_or_else(|e| panic!("failed to bind table {name}: {e}"));
    (store, table)
}

/// A widget record under `namespace` with a numeric rank.
#[must_use]
pub fn widget(namespace: &str, id: &str, rank: i64) -> Record {
    Record::from([
        ("namespace".to_owned(), Value::from(namespace)),
        ("id".to_owned(), Value::from(id)),
        ("rank".to_owned(), Value::from(rank)),
    ])
}

/// The key attributes of one widget.
#[must_use]
pub fn widget_key(namespace: &str, id: &str) -> Record {
    Record::from([
        ("namespace".to_owned(), Value::from(namespace)),
        ("id".to_owned(), Value::from(id)),
    ])
}

/// Insert `count` widgets with zero-padded ids, in order.
pub async fn seed_widgets(table: &Table, namespace: &str, count: i64) {
    for n in 0..count {
        table
            .insert(widget(namespace, &format!("id-{n:02}"), n))
            .await
            .unwrap_or_else(|e| panic!("failed to seed widget {n}: {e}"));
    }
}

/// Ids of a page of items, in order.
#[must_use]
pub fn ids(items: &[Record]) -> Vec<String> {
    items
        .iter()
        .map(|item| item["id"].as_str().unwrap_or_default().to_owned())
        .collect()
}

mod test_bulk;
mod test_collections;
mod test_fetch;
mod test_paging;
mod test_retry;
mod test_writes;
