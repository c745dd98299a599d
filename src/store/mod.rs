//! Persistent ledger: append-only outbox audit trail plus the global,
//! time-unbounded dedup key set.

pub mod libsql_ledger;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_ledger::LibSqlLedger;
pub use memory::MemoryLedger;
pub use traits::{DedupKey, Ledger, LedgerStats, OutboxEntry, Status};
