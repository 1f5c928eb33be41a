//! Bounded-backoff reconnection supervisor.
//!
//! Drives a caller-supplied reconnection action through a retry schedule:
//! each try is announced on the bus, delayed by an exponentially growing,
//! capped backoff, and cancellable up to the moment it runs. At most one
//! reconnection sequence runs per supervisor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, FarmEvent};

/// Retry schedule parameters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub multiplier: f64,
	pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_secs(5),
			max_delay: Duration::from_secs(300),
			multiplier: 2.0,
			max_attempts: 10,
		}
	}
}

impl ReconnectPolicy {
	/// Delay before try number `attempt` (zero-based):
	/// `min(base_delay * multiplier^attempt, max_delay)`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let grown = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt.min(1_000) as i32);
		Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
	}
}

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
	Idle,
	Reconnecting,
	Failed,
}

/// Failure signal returned by a reconnection action.
#[derive(Debug)]
pub enum RetryError {
	/// Worth another try within the attempt budget.
	Retry(String),
	/// Pointless to retry (credentials rejected, account cooled down);
	/// the sequence fails immediately.
	Fatal(String),
}

#[derive(Debug)]
struct SupervisorState {
	state: ReconnectState,
	attempt: u32,
	last_disconnect: Option<String>,
	cancel: Option<CancellationToken>,
}

/// Retries a reconnection action with bounded exponential backoff.
pub struct ReconnectSupervisor {
	account: String,
	policy: ReconnectPolicy,
	bus: Arc<EventBus>,
	state: Mutex<SupervisorState>,
}

impl ReconnectSupervisor {
	pub fn new(account: impl Into<String>, policy: ReconnectPolicy, bus: Arc<EventBus>) -> Self {
		Self {
			account: account.into(),
			policy,
			bus,
			state: Mutex::new(SupervisorState {
				state: ReconnectState::Idle,
				attempt: 0,
				last_disconnect: None,
				cancel: None,
			}),
		}
	}

	pub fn state(&self) -> ReconnectState {
		self.state.lock().state
	}

	/// Zero-based index of the next try while reconnecting.
	pub fn attempts_made(&self) -> u32 {
		self.state.lock().attempt
	}

	pub fn policy(&self) -> &ReconnectPolicy {
		&self.policy
	}

	/// Remembers why the session dropped, for the terminal notification.
	pub fn record_disconnect(&self, reason: impl Into<String>) {
		self.state.lock().last_disconnect = Some(reason.into());
	}

	/// The most recently recorded disconnect reason, if any.
	pub fn last_disconnect(&self) -> Option<String> {
		self.state.lock().last_disconnect.clone()
	}

	/// Begins a supervised reconnection sequence. No-op while one is already
	/// running; a sequence left in `Failed` is restarted from attempt zero.
	pub fn start_reconnect<F, Fut>(self: &Arc<Self>, reconnect: F)
	where
		F: Fn(u32) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<(), RetryError>> + Send,
	{
		let token = {
			let mut state = self.state.lock();
			if state.state == ReconnectState::Reconnecting {
				debug!(
					target = "farm.reconnect",
					account = self.account,
					"reconnect already in progress; ignoring"
				);
				return;
			}
			state.state = ReconnectState::Reconnecting;
			state.attempt = 0;
			let token = CancellationToken::new();
			state.cancel = Some(token.clone());
			token
		};

		let supervisor = Arc::clone(self);
		tokio::spawn(async move { supervisor.run_retries(token, reconnect).await });
	}

	/// Cancels any pending scheduled try and forces `Idle`. Once this
	/// returns, a try that was still waiting on its delay will never run.
	pub fn stop_reconnect(&self) {
		let token = {
			let mut state = self.state.lock();
			state.state = ReconnectState::Idle;
			state.attempt = 0;
			state.cancel.take()
		};
		if let Some(token) = token {
			token.cancel();
			debug!(
				target = "farm.reconnect",
				account = self.account,
				"pending reconnect cancelled"
			);
		}
	}

	async fn run_retries<F, Fut>(&self, token: CancellationToken, reconnect: F)
	where
		F: Fn(u32) -> Fut + Send + Sync,
		Fut: Future<Output = std::result::Result<(), RetryError>> + Send,
	{
		loop {
			let attempt = self.state.lock().attempt;
			let delay = self.policy.delay_for(attempt);

			self.bus.publish(&FarmEvent::Reconnecting {
				account: self.account.clone(),
				attempt: attempt + 1,
				max_attempts: self.policy.max_attempts,
				delay,
			});
			info!(
				target = "farm.reconnect",
				account = self.account,
				attempt = attempt + 1,
				max_attempts = self.policy.max_attempts,
				delay_secs = delay.as_secs_f64(),
				"scheduling reconnect"
			);

			tokio::select! {
				_ = token.cancelled() => return,
				_ = time::sleep(delay) => {}
			}
			// stop_reconnect() may have landed between the timer firing and
			// this point; a cancelled try must never invoke the action.
			if token.is_cancelled() {
				return;
			}

			match reconnect(attempt).await {
				Ok(()) => {
					if token.is_cancelled() {
						return;
					}
					{
						let mut state = self.state.lock();
						state.state = ReconnectState::Idle;
						state.attempt = 0;
						state.cancel = None;
					}
					info!(
						target = "farm.reconnect",
						account = self.account,
						"session re-established"
					);
					self.bus.publish(&FarmEvent::Reconnected {
						account: self.account.clone(),
					});
					return;
				}
				Err(RetryError::Fatal(reason)) => {
					if token.is_cancelled() {
						return;
					}
					{
						let mut state = self.state.lock();
						state.state = ReconnectState::Failed;
						state.cancel = None;
						state.last_disconnect = Some(reason.clone());
					}
					warn!(
						target = "farm.reconnect",
						account = self.account,
						reason,
						"reconnect failed terminally"
					);
					self.bus.publish(&FarmEvent::ReconnectFailed {
						account: self.account.clone(),
						reason,
					});
					return;
				}
				Err(RetryError::Retry(error)) => {
					let exhausted = {
						let mut state = self.state.lock();
						if token.is_cancelled() {
							return;
						}
						state.attempt += 1;
						state.attempt >= self.policy.max_attempts
					};
					warn!(
						target = "farm.reconnect",
						account = self.account,
						attempt = attempt + 1,
						error,
						"reconnect attempt failed"
					);

					if exhausted {
						let reason = {
							let mut state = self.state.lock();
							state.state = ReconnectState::Failed;
							state.cancel = None;
							state.last_disconnect.clone().unwrap_or(error)
						};
						warn!(
							target = "farm.reconnect",
							account = self.account,
							attempts = self.policy.max_attempts,
							reason,
							"giving up on reconnect"
						);
						self.bus.publish(&FarmEvent::ReconnectFailed {
							account: self.account.clone(),
							reason,
						});
						return;
					}
				}
			}
		}
	}
}
