//! DataGate engine
//!
//! The core of the sensitive-data approval system: classify a change
//! against a project's rules, select the flow gating the strongest matched
//! level, run the flow's execution state machine, and gate plan execution
//! on the outcome.
//!
//! Component map:
//! - [`matcher`]: pure rule classification over `(table, field)` pairs
//! - [`selector`]: flow selection with ordinal walk-down and built-in
//!   defaults
//! - [`state_machine`]: pure per-decision transition planning
//! - [`ExecutionEngine`]: transactional execution orchestration over a
//!   [`datagate_storage::DataGateStore`]
//! - [`ChangeGate`]: the plan-check entry point producing admit/block/deny
//!   verdicts
//! - [`EventSink`]: post-commit, fire-and-forget event emission
//!
//! External collaborators are injected at the seams: a
//! [`ChangeExtractor`] supplies affected columns, an [`AuthorityResolver`]
//! answers group/role membership, an [`EventSink`] consumes events, and a
//! [`Clock`] stamps them.

#![deny(unsafe_code)]

mod authority;
mod clock;
mod engine;
mod error;
mod events;
mod extract;
pub mod matcher;
pub mod selector;
pub mod state_machine;

mod gate;

pub use authority::{AuthorityContext, AuthorityError, AuthorityResolver, StaticAuthorityResolver};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{ExecutionEngine, RecordedDecision};
pub use error::{EngineError, EngineResult};
pub use events::{BroadcastSink, EventSink, NullSink, RecordingSink};
pub use extract::{ChangeExtractor, ExtractError, NaiveSqlExtractor, StaticExtractor};
pub use gate::{ChangeGate, GateConfig, PlanCheckRequest, Verdict};
pub use matcher::{classify_changes, MatchOutcome, RuleMatch};
pub use selector::{builtin_flow, select_flow, FlowSelection};
pub use state_machine::{evaluate_node, plan_transition, NodeDisposition, TransitionPlan};
