//! Durable document store backends.
//!
//! | Backend   | Type                      | Use                                   |
//! |-----------|---------------------------|---------------------------------------|
//! | Memory    | [`memory::MemoryDocumentStore`]   | tests, single-process setups  |
//! | Redis     | [`redis::RedisDocumentStore`]     | shared network store          |
//! | SQL       | [`sql::SqlDocumentStore`]         | MySQL or SQLite               |
//! | Offline   | [`offline::OfflineDocumentStore`] | backend unreachable at start  |

pub mod memory;
pub mod offline;
pub mod redis;
pub mod sql;
pub mod traits;
