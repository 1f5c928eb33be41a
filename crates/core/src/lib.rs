//! Resilience and accounting layer for remote presence sessions.
//!
//! Keeps one or more provider sessions alive — each reporting a configured
//! set of activities as currently active — across network interruption,
//! credential re-challenge, and process restarts, without losing accumulated
//! progress.
//!
//! The wire protocol lives behind the `idlefarm-provider` boundary trait.
//! This crate supplies the machinery around it:
//!
//! - [`EventBus`]: typed pub/sub with removable subscriptions
//! - [`SessionCache`]: durable account → session-token store
//! - [`PlaytimeAccumulator`]: crash-safe per-activity playtime ledger
//! - [`ReconnectSupervisor`]: bounded exponential-backoff retry
//! - [`SessionOrchestrator`]: the per-account lifecycle state machine
//! - [`FleetRunner`]: staggered, independent multi-account operation

mod accumulator;
mod bus;
mod cache;
mod error;
mod fleet;
mod orchestrator;
pub mod persist;
mod supervisor;

pub use accumulator::{PlaytimeAccumulator, TargetSpec};
pub use bus::{EventBus, EventKind, FarmEvent, Subscription};
pub use cache::SessionCache;
pub use error::{FarmError, Result};
pub use fleet::FleetRunner;
pub use orchestrator::{
	AccountIdentity, ActivityStatus, CompletedActivity, OrchestratorConfig, SessionOrchestrator,
	SessionPhase, StatusSnapshot,
};
pub use supervisor::{ReconnectPolicy, ReconnectState, ReconnectSupervisor, RetryError};
