//! DataGate storage abstractions.
//!
//! This crate defines the persistence contract for the approval engine:
//! - sensitive data rules and approval flows (configuration aggregates)
//! - flow executions with node executions and approvals (runtime aggregate)
//! - sensitive-change audit rows written on first gate admission
//! - outbound notification records
//!
//! Design stance:
//! - Postgres is the transactional source of truth; the in-memory adapter
//!   is a deterministic, test-friendly reference implementation.
//! - Every write that touches more than one table goes through a compound
//!   trait operation executed in a single transaction. Quorum recounts must
//!   see a consistent set of approvals, so the execution aggregate is
//!   serialized through a row lock (Postgres) or the state lock (memory).
//! - Compound execution writes carry caller-computed expectations; a
//!   mismatch after lock acquisition surfaces as [`StorageError::Conflict`]
//!   and the caller re-reads and recomputes.

#![deny(unsafe_code)]

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryDataGateStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDataGateStore;
pub use traits::{
    ChangeStore, DataGateStore, ExecutionAdvance, ExecutionFilter, ExecutionStore, FlowFilter,
    FlowPatch, FlowStore, NewApproval, NewChange, NewExecution, NewFlow, NewNode, NewNotification,
    NewRule, NodeStatusUpdate, NotificationStore, QueryWindow, RulePatch, RuleStore,
};
