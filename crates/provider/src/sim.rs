//! Deterministic in-process provider.
//!
//! Implements [`SessionProvider`] over process-local state with failure
//! injection, so the resilience layer can be driven end-to-end without a
//! network: synthetic log-on failures, forced disconnects, challenge
//! requirements, token expiry, and rate limiting. Used by the test suites and
//! by the CLI for dry runs.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::SessionProvider;
use crate::error::{ProviderError, Result};
use crate::events::ProviderEvent;
use crate::types::{
	AccountInfo, ActivityEntry, DisconnectReason, LogOnOutcome, LogOnRequest, PresenceState,
};

/// The one second-factor code the simulator accepts interactively.
pub const VALID_CODE: &str = "173205";

#[derive(Debug, Default)]
struct SimState {
	connected: bool,
	logged_on: bool,
	pending_challenge: Option<LogOnRequest>,
	fail_next_logons: u32,
	require_code: bool,
	reject_credentials: bool,
	rate_limited: bool,
	expire_tokens: bool,
	issued_tokens: HashSet<String>,
	token_counter: u32,
	logon_attempts: u32,
	activity_log: Vec<Vec<ActivityEntry>>,
	presence_log: Vec<PresenceState>,
}

/// Loopback session provider with injectable failures.
#[derive(Default)]
pub struct SimProvider {
	state: Mutex<SimState>,
	events: Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl SimProvider {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fails the next `n` log-on attempts with a synthetic network error.
	pub fn fail_next_logons(&self, n: u32) {
		self.state.lock().fail_next_logons = n;
	}

	/// Requires a second-factor code for credential log-ons without a seed.
	pub fn require_code(&self, on: bool) {
		self.state.lock().require_code = on;
	}

	/// Rejects all credential log-ons as bad authentication.
	pub fn reject_credentials(&self, on: bool) {
		self.state.lock().reject_credentials = on;
	}

	/// Answers every log-on with a rate-limit rejection.
	pub fn rate_limited(&self, on: bool) {
		self.state.lock().rate_limited = on;
	}

	/// Rejects previously issued session tokens.
	pub fn expire_tokens(&self, on: bool) {
		self.state.lock().expire_tokens = on;
	}

	/// Drops the session from the provider side.
	pub fn force_disconnect(&self, reason: DisconnectReason) {
		{
			let mut state = self.state.lock();
			state.connected = false;
			state.logged_on = false;
		}
		self.emit(ProviderEvent::Disconnected(reason));
	}

	pub fn is_logged_on(&self) -> bool {
		self.state.lock().logged_on
	}

	/// Every activity set broadcast so far, oldest first.
	pub fn broadcasts(&self) -> Vec<Vec<ActivityEntry>> {
		self.state.lock().activity_log.clone()
	}

	pub fn last_broadcast(&self) -> Option<Vec<ActivityEntry>> {
		self.state.lock().activity_log.last().cloned()
	}

	pub fn last_presence(&self) -> Option<PresenceState> {
		self.state.lock().presence_log.last().copied()
	}

	pub fn logon_attempts(&self) -> u32 {
		self.state.lock().logon_attempts
	}

	fn emit(&self, event: ProviderEvent) {
		if let Some(tx) = self.events.lock().as_ref() {
			let _ = tx.send(event);
		}
	}

	fn complete_logon(&self, request: &LogOnRequest) -> LogOnOutcome {
		let (info, token) = {
			let mut state = self.state.lock();
			state.token_counter += 1;
			let token = format!("sim-{}-{:04x}", request.account, state.token_counter);
			state.issued_tokens.insert(token.clone());
			state.logged_on = true;
			state.pending_challenge = None;
			let info = AccountInfo {
				account: request.account.clone(),
				display_name: None,
			};
			(info, token)
		};
		self.emit(ProviderEvent::LoggedOn(info.clone()));
		LogOnOutcome::LoggedOn {
			info,
			session_token: Some(token),
		}
	}
}

#[async_trait]
impl SessionProvider for SimProvider {
	async fn connect(&self) -> Result<()> {
		self.state.lock().connected = true;
		self.emit(ProviderEvent::Connected);
		Ok(())
	}

	async fn disconnect(&self) {
		let mut state = self.state.lock();
		state.connected = false;
		state.logged_on = false;
		state.pending_challenge = None;
	}

	async fn log_on(&self, request: LogOnRequest) -> Result<LogOnOutcome> {
		{
			let mut state = self.state.lock();
			if !state.connected {
				return Err(ProviderError::NotConnected);
			}
			state.logon_attempts += 1;

			if state.rate_limited {
				return Err(ProviderError::RateLimited("too many logons".into()));
			}
			if state.fail_next_logons > 0 {
				state.fail_next_logons -= 1;
				return Err(ProviderError::Network("synthetic link failure".into()));
			}

			if let Some(token) = &request.session_token {
				if state.expire_tokens || !state.issued_tokens.contains(token) {
					return Err(ProviderError::InvalidSessionToken);
				}
			} else {
				if state.reject_credentials {
					return Err(ProviderError::AuthRejected("bad account or password".into()));
				}
				let code_ok = request.otp_seed.is_some()
					|| request.one_time_code.as_deref() == Some(VALID_CODE);
				if state.require_code && !code_ok {
					state.pending_challenge = Some(request.clone());
					return Ok(LogOnOutcome::ChallengeRequired {
						domain_hint: Some("sim".into()),
						last_code_wrong: request.one_time_code.is_some(),
					});
				}
			}
		}
		Ok(self.complete_logon(&request))
	}

	async fn submit_code(&self, code: &str) -> Result<LogOnOutcome> {
		let pending = {
			let state = self.state.lock();
			if !state.connected {
				return Err(ProviderError::NotConnected);
			}
			state.pending_challenge.clone()
		};
		let Some(request) = pending else {
			return Err(ProviderError::Network("no challenge pending".into()));
		};
		if code != VALID_CODE {
			return Ok(LogOnOutcome::ChallengeRequired {
				domain_hint: Some("sim".into()),
				last_code_wrong: true,
			});
		}
		Ok(self.complete_logon(&request))
	}

	async fn set_activities(&self, activities: &[ActivityEntry]) -> Result<()> {
		let mut state = self.state.lock();
		if !state.connected {
			return Err(ProviderError::NotConnected);
		}
		state.activity_log.push(activities.to_vec());
		Ok(())
	}

	async fn set_presence_state(&self, presence: PresenceState) -> Result<()> {
		let mut state = self.state.lock();
		if !state.connected {
			return Err(ProviderError::NotConnected);
		}
		state.presence_log.push(presence);
		Ok(())
	}

	fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		*self.events.lock() = Some(tx);
		rx
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn credential_request() -> LogOnRequest {
		LogOnRequest {
			account: "alice".into(),
			password: Some("hunter2".into()),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn credential_logon_issues_a_reusable_token() {
		let sim = SimProvider::new();
		sim.connect().await.unwrap();

		let outcome = sim.log_on(credential_request()).await.unwrap();
		let LogOnOutcome::LoggedOn { session_token, .. } = outcome else {
			panic!("expected logged-on outcome");
		};
		let token = session_token.unwrap();

		sim.force_disconnect(DisconnectReason::new(1, "drop"));
		sim.connect().await.unwrap();

		let mut relogon = LogOnRequest::new("alice");
		relogon.session_token = Some(token);
		assert!(matches!(
			sim.log_on(relogon).await.unwrap(),
			LogOnOutcome::LoggedOn { .. }
		));
	}

	#[tokio::test]
	async fn unknown_or_expired_tokens_are_rejected() {
		let sim = SimProvider::new();
		sim.connect().await.unwrap();

		let mut request = LogOnRequest::new("alice");
		request.session_token = Some("made-up".into());
		assert!(matches!(
			sim.log_on(request).await,
			Err(ProviderError::InvalidSessionToken)
		));
	}

	#[tokio::test]
	async fn challenge_flow_accepts_the_valid_code_only() {
		let sim = SimProvider::new();
		sim.require_code(true);
		sim.connect().await.unwrap();

		let outcome = sim.log_on(credential_request()).await.unwrap();
		assert!(matches!(
			outcome,
			LogOnOutcome::ChallengeRequired {
				last_code_wrong: false,
				..
			}
		));

		let wrong = sim.submit_code("000000").await.unwrap();
		assert!(matches!(
			wrong,
			LogOnOutcome::ChallengeRequired {
				last_code_wrong: true,
				..
			}
		));

		let right = sim.submit_code(VALID_CODE).await.unwrap();
		assert!(matches!(right, LogOnOutcome::LoggedOn { .. }));
	}

	#[tokio::test]
	async fn otp_seed_skips_the_interactive_challenge() {
		let sim = SimProvider::new();
		sim.require_code(true);
		sim.connect().await.unwrap();

		let mut request = credential_request();
		request.otp_seed = Some("shared-seed".into());
		assert!(matches!(
			sim.log_on(request).await.unwrap(),
			LogOnOutcome::LoggedOn { .. }
		));
	}

	#[tokio::test]
	async fn forced_disconnect_reaches_the_subscriber() {
		let sim = SimProvider::new();
		let mut events = sim.subscribe();
		sim.connect().await.unwrap();
		sim.force_disconnect(DisconnectReason::new(3, "remote closed"));

		assert!(matches!(events.recv().await, Some(ProviderEvent::Connected)));
		let Some(ProviderEvent::Disconnected(reason)) = events.recv().await else {
			panic!("expected disconnect event");
		};
		assert_eq!(reason.code, 3);
	}

	#[tokio::test]
	async fn injected_logon_failures_burn_down() {
		let sim = SimProvider::new();
		sim.fail_next_logons(2);
		sim.connect().await.unwrap();

		for _ in 0..2 {
			assert!(matches!(
				sim.log_on(credential_request()).await,
				Err(ProviderError::Network(_))
			));
		}
		assert!(matches!(
			sim.log_on(credential_request()).await.unwrap(),
			LogOnOutcome::LoggedOn { .. }
		));
		assert_eq!(sim.logon_attempts(), 3);
	}
}
