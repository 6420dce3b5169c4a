//! In-memory store backend.
//!
//! [`MemoryStore`] keeps whole tables in process memory with the same
//! observable semantics as a wire backend: typed key ordering, condition
//! and update expressions, index queries, paging with resume keys, and the
//! service's error vocabulary. It exists so repositories built on
//! [`dynopage_core`] can run their tests without a network or a local
//! emulator, and its failure-injection hook makes retry behavior testable.
//!
//! ```
//! use dynopage_mem::{MemoryStore, TableDef};
//!
//! let store = MemoryStore::new();
//! store.create_table(
//!     TableDef::new("todos").with_partition("pk").with_sort("sk"),
//! )?;
//! # Ok::<(), dynopage_model::StoreError>(())
//! ```

pub mod expression;
pub mod storage;
pub mod store;

pub use store::{IndexDef, MemoryStore, TableDef};
