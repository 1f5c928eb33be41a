//! Session-provider boundary.
//!
//! The wire protocol (handshake, authentication exchange, message framing) is
//! an external collaborator. This crate pins down the seam the resilience
//! layer talks through: the [`SessionProvider`] trait, the types crossing it,
//! the error taxonomy that drives retry decisions, and a deterministic
//! loopback implementation ([`sim`]) for tests and dry runs.

mod error;
mod events;
mod types;

pub mod sim;

pub use error::{ProviderError, Result};
pub use events::ProviderEvent;
pub use types::{
	AccountInfo, ActivityEntry, DisconnectReason, LogOnOutcome, LogOnRequest, PresenceState,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Operations a session provider must expose to the resilience layer.
///
/// Implementations are shared behind `Arc` and called from one orchestrator
/// task per account; all methods take `&self`.
#[async_trait]
pub trait SessionProvider: Send + Sync {
	/// Establishes the underlying transport.
	async fn connect(&self) -> Result<()>;

	/// Tears the transport down. Infallible by design: a dead link is torn
	/// down already.
	async fn disconnect(&self);

	/// Runs one log-on attempt. A `ChallengeRequired` outcome suspends the
	/// flow until [`submit_code`](Self::submit_code) resolves it.
	async fn log_on(&self, request: LogOnRequest) -> Result<LogOnOutcome>;

	/// Answers a pending second-factor challenge.
	async fn submit_code(&self, code: &str) -> Result<LogOnOutcome>;

	/// Replaces the set of activities broadcast as currently active.
	async fn set_activities(&self, activities: &[ActivityEntry]) -> Result<()>;

	/// Sets the presence visibility for the session.
	async fn set_presence_state(&self, presence: PresenceState) -> Result<()>;

	/// Hands out the stream of asynchronous provider events. Single consumer;
	/// a later call supersedes earlier receivers.
	fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}
