//! Query construction and cursor pagination for DynamoDB-style item stores.
//!
//! The crate is layered. [`Expressions`] accumulates the placeholder maps and
//! string fragments of one operation's expressions. [`Request`] builds and
//! executes single wire operations on top of a [`StoreClient`], including the
//! over-fetching pagination loop that turns raw `LastEvaluatedKey` plumbing
//! into stable logical pages. [`Table`] binds a client to one table's key
//! schema and exposes the operations applications actually call: `fetch` with
//! opaque bidirectional cursors, guarded inserts, generated updates, list and
//! set mutations, and bulk helpers.
//!
//! Values cross the wire through [`codec`], which owns the attribute-value
//! encoding rules (empty-string sentinel, stringified numbers, set
//! homogeneity). Nothing here talks to a real network; any [`StoreClient`]
//! implementation will do.
// Counts cross between wire i32s, logical i64s, and usize buffer math.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod client;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod expression;
pub mod request;
pub mod retry;
pub mod schema;
pub mod table;
pub mod value;

mod time;

pub use client::StoreClient;
pub use error::{Error, Result};
pub use expression::{CREATED_AT, Expressions, Join, UPDATED_AT};
pub use request::{
    DEFAULT_PAGE_SIZE, InsertOptions, KeyValues, QueryPage, QueryStats, Request, SelectSpec,
    UpdateOptions, UpdateSpec,
};
pub use retry::{RetryDecider, RetryPolicy, retry};
pub use schema::{IndexKeys, ResolvedKeys, Schema};
pub use table::{
    CURSOR_FIRST, CURSOR_LAST, Fetch, FetchOutput, HookContext, HookOverride, Table, TableBuilder,
    WriteHook, WriteKind,
};
pub use value::{Record, Value};
