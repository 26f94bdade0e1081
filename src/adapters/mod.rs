pub mod memory_ledger_store;
pub mod postgres_ledger_store;

pub use memory_ledger_store::{FaultPlan, InMemoryLedgerStore};
pub use postgres_ledger_store::PostgresLedgerStore;
