//! Per-account session lifecycle.
//!
//! One orchestrator owns everything a single account needs: its event bus,
//! token cache, playtime ledger, reconnection supervisor, and the provider
//! handle. `run` drives login and then a single select loop, so provider
//! events, the checkpoint tick, and shutdown are serialized per account.
//!
//! Lifecycle: LoggedOut → Connecting → {ChallengeRequired → Connecting |
//! LoggedOn} → Disconnected → Reconnecting → {LoggedOn | Failed} →
//! LoggedOut.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use idlefarm_provider::{
	AccountInfo, ActivityEntry, DisconnectReason, LogOnOutcome, LogOnRequest, PresenceState,
	ProviderError, ProviderEvent, SessionProvider,
};

use crate::accumulator::{PlaytimeAccumulator, TargetSpec};
use crate::bus::{EventBus, EventKind, FarmEvent};
use crate::cache::SessionCache;
use crate::error::{FarmError, Result};
use crate::supervisor::{ReconnectPolicy, ReconnectSupervisor, RetryError};

/// Identity material for one account run. Supplied by the caller, never
/// mutated here.
#[derive(Debug, Clone)]
pub struct AccountIdentity {
	pub account: String,
	pub password: Option<String>,
	/// Pre-shared second-factor seed; when present, challenges are resolved
	/// by the provider without interactive entry.
	pub otp_seed: Option<String>,
}

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
	/// Root for per-account persisted state (`sessions/`, `ledgers/`).
	pub data_dir: PathBuf,
	pub checkpoint_interval: Duration,
	pub login_timeout: Duration,
	/// How long to wait for an interactively entered challenge code.
	pub challenge_timeout: Duration,
	pub reconnect: ReconnectPolicy,
}

impl OrchestratorConfig {
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			data_dir: data_dir.into(),
			checkpoint_interval: Duration::from_secs(60),
			login_timeout: Duration::from_secs(15),
			challenge_timeout: Duration::from_secs(120),
			reconnect: ReconnectPolicy::default(),
		}
	}
}

/// Account-level lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
	LoggedOut,
	Connecting,
	ChallengeRequired,
	LoggedOn,
	Disconnected,
	Reconnecting,
	Failed,
}

/// A target completion echoed back to the caller.
#[derive(Debug, Clone)]
pub struct CompletedActivity {
	pub account: String,
	pub entry: ActivityEntry,
	pub total_secs: f64,
}

/// Live per-activity progress for display.
#[derive(Debug, Clone)]
pub struct ActivityStatus {
	pub entry: ActivityEntry,
	pub accumulated_secs: f64,
	pub target_hours: Option<f64>,
}

/// Point-in-time view of one account for display.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
	pub account: String,
	pub phase: SessionPhase,
	pub activities: Vec<ActivityStatus>,
}

/// Drives one account: login, activity broadcast, failure handling,
/// supervised reconnect, accumulation, target trimming, teardown.
#[derive(Clone)]
pub struct SessionOrchestrator {
	inner: Arc<Inner>,
}

struct Inner {
	identity: AccountIdentity,
	custom_label: Option<String>,
	targets: TargetSpec,
	config: OrchestratorConfig,
	provider: Arc<dyn SessionProvider>,
	bus: Arc<EventBus>,
	cache: SessionCache,
	accumulator: Mutex<PlaytimeAccumulator>,
	supervisor: Arc<ReconnectSupervisor>,
	activities: Mutex<Vec<ActivityEntry>>,
	phase: Mutex<SessionPhase>,
	stop: CancellationToken,
	terminal: CancellationToken,
	teardown_done: tokio::sync::Mutex<bool>,
	codes_tx: mpsc::UnboundedSender<String>,
	codes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
	completions: Mutex<Option<mpsc::UnboundedSender<CompletedActivity>>>,
}

impl SessionOrchestrator {
	pub fn new(
		identity: AccountIdentity,
		activities: Vec<ActivityEntry>,
		targets: TargetSpec,
		custom_label: Option<String>,
		provider: Arc<dyn SessionProvider>,
		config: OrchestratorConfig,
	) -> Self {
		let bus = EventBus::new();
		let cache = SessionCache::new(config.data_dir.join("sessions"));
		let accumulator =
			PlaytimeAccumulator::open(&identity.account, &config.data_dir.join("ledgers"));
		let supervisor = Arc::new(ReconnectSupervisor::new(
			&identity.account,
			config.reconnect.clone(),
			Arc::clone(&bus),
		));
		let (codes_tx, codes_rx) = mpsc::unbounded_channel();

		Self {
			inner: Arc::new(Inner {
				identity,
				custom_label,
				targets,
				config,
				provider,
				bus,
				cache,
				accumulator: Mutex::new(accumulator),
				supervisor,
				activities: Mutex::new(activities),
				phase: Mutex::new(SessionPhase::LoggedOut),
				stop: CancellationToken::new(),
				terminal: CancellationToken::new(),
				teardown_done: tokio::sync::Mutex::new(false),
				codes_tx,
				codes_rx: tokio::sync::Mutex::new(codes_rx),
				completions: Mutex::new(None),
			}),
		}
	}

	pub fn account(&self) -> &str {
		&self.inner.identity.account
	}

	pub fn bus(&self) -> &Arc<EventBus> {
		&self.inner.bus
	}

	pub fn phase(&self) -> SessionPhase {
		*self.inner.phase.lock()
	}

	/// Wires the channel that receives target completions.
	pub fn set_completion_sink(&self, sink: mpsc::UnboundedSender<CompletedActivity>) {
		*self.inner.completions.lock() = Some(sink);
	}

	/// Feeds an interactively entered second-factor code to a pending
	/// challenge.
	pub fn submit_code(&self, code: impl Into<String>) {
		let _ = self.inner.codes_tx.send(code.into());
	}

	pub fn status(&self) -> StatusSnapshot {
		let accumulator = self.inner.accumulator.lock();
		let activities = self
			.inner
			.activities
			.lock()
			.iter()
			.map(|entry| ActivityStatus {
				accumulated_secs: accumulator.live_secs(entry.id),
				target_hours: self.inner.targets.get(&entry.id).copied(),
				entry: entry.clone(),
			})
			.collect();
		StatusSnapshot {
			account: self.inner.identity.account.clone(),
			phase: self.phase(),
			activities,
		}
	}

	/// Adds an activity to the broadcast set at runtime. Returns `false`
	/// when the id is already present.
	pub async fn add_activity(&self, entry: ActivityEntry) -> Result<bool> {
		let added = {
			let mut activities = self.inner.activities.lock();
			if activities.iter().any(|a| a.id == entry.id) {
				false
			} else {
				activities.push(entry.clone());
				true
			}
		};
		if !added {
			return Ok(false);
		}

		info!(
			target = "farm.session",
			account = self.inner.identity.account,
			activity = entry.id,
			"activity added"
		);
		if self.phase() == SessionPhase::LoggedOn {
			self.inner.accumulator.lock().begin(&[entry.id]);
			self.inner.rebroadcast().await?;
		}
		Ok(true)
	}

	/// Removes an activity and its ledger entry. Returns `false` when the
	/// id was not in the broadcast set.
	pub async fn remove_activity(&self, id: u32) -> Result<bool> {
		let removed = {
			let mut activities = self.inner.activities.lock();
			match activities.iter().position(|a| a.id == id) {
				Some(index) => {
					activities.remove(index);
					true
				}
				None => false,
			}
		};
		if !removed {
			return Ok(false);
		}

		info!(
			target = "farm.session",
			account = self.inner.identity.account,
			activity = id,
			"activity removed"
		);
		self.inner.accumulator.lock().drop_activities(&[id]);
		if self.phase() == SessionPhase::LoggedOn {
			self.inner.rebroadcast().await?;
		}
		Ok(true)
	}

	/// Drops the session on purpose and lets the supervisor bring it back.
	pub async fn reconnect_now(&self) {
		if self.inner.stop.is_cancelled() {
			return;
		}
		info!(
			target = "farm.session",
			account = self.inner.identity.account,
			"manual reconnect requested"
		);
		self.inner.accumulator.lock().suspend();
		self.inner.provider.disconnect().await;
		self.inner
			.announce_disconnect(&DisconnectReason::new(0, "reconnect requested"));
		self.inner.begin_reconnect();
	}

	/// Runs the account until stopped, failed, or all targets are reached.
	pub async fn run(&self) -> Result<()> {
		let inner = &self.inner;

		// Subscribe before login so no provider event is missed, and turn the
		// supervisor's terminal notification into loop exit.
		let mut events = inner.provider.subscribe();
		let _terminal_sub = {
			let terminal = inner.terminal.clone();
			inner
				.bus
				.subscribe(EventKind::ReconnectFailed, move |_| terminal.cancel())
		};

		match inner.login().await {
			Ok(()) => {}
			Err(err) if err.is_transient() && !inner.stop.is_cancelled() => {
				warn!(
					target = "farm.session",
					account = inner.identity.account,
					error = %err,
					"initial login failed; handing to reconnect supervisor"
				);
				inner.supervisor.record_disconnect(err.to_string());
				inner.begin_reconnect();
			}
			Err(err) => return inner.conclude(Err(err)).await,
		}

		let mut tick = time::interval_at(
			time::Instant::now() + inner.config.checkpoint_interval,
			inner.config.checkpoint_interval,
		);
		tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

		let result = loop {
			tokio::select! {
				_ = inner.stop.cancelled() => break Ok(()),
				_ = inner.terminal.cancelled() => {
					let reason = inner
						.supervisor
						.last_disconnect()
						.unwrap_or_else(|| "connection lost".to_string());
					break Err(FarmError::ReconnectExhausted {
						attempts: inner.config.reconnect.max_attempts,
						reason,
					});
				}
				event = events.recv() => match event {
					Some(event) => inner.handle_provider_event(event).await,
					None => break Err(FarmError::Provider(ProviderError::NotConnected)),
				},
				_ = tick.tick() => {
					if inner.on_tick().await.is_break() {
						break Ok(());
					}
				}
			}
		};

		inner.conclude(result).await
	}

	/// Stops farming: cancels any pending reconnect, checkpoints, broadcasts
	/// an empty activity set, goes offline, and disconnects. Once this
	/// returns, no reconnect closure will fire.
	pub async fn stop(&self) {
		info!(
			target = "farm.session",
			account = self.inner.identity.account,
			"stop requested"
		);
		self.inner.stop.cancel();
		self.inner.teardown().await;
	}
}

impl Inner {
	fn set_phase(&self, phase: SessionPhase) {
		let mut current = self.phase.lock();
		if *current != phase {
			debug!(
				target = "farm.session",
				account = self.identity.account,
				from = ?*current,
				to = ?phase,
				"phase change"
			);
			*current = phase;
		}
	}

	fn phase(&self) -> SessionPhase {
		*self.phase.lock()
	}

	fn activity_ids(&self) -> Vec<u32> {
		self.activities.lock().iter().map(|a| a.id).collect()
	}

	/// The set handed to the provider: the display label, when configured,
	/// takes the top slot.
	fn broadcast_set(&self) -> Vec<ActivityEntry> {
		let activities = self.activities.lock();
		let mut set = Vec::with_capacity(activities.len() + 1);
		if let Some(label) = &self.custom_label {
			set.push(ActivityEntry::labeled(0, label.clone()));
		}
		set.extend(activities.iter().cloned());
		set
	}

	async fn rebroadcast(&self) -> Result<()> {
		let set = self.broadcast_set();
		self.provider.set_activities(&set).await?;
		Ok(())
	}

	async fn login(&self) -> Result<()> {
		self.set_phase(SessionPhase::Connecting);
		self.bus.publish(&FarmEvent::Connecting {
			account: self.identity.account.clone(),
		});
		info!(
			target = "farm.session",
			account = self.identity.account,
			"connecting"
		);

		match time::timeout(self.config.login_timeout, self.provider.connect()).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => return Err(classify(err)),
			Err(_) => return Err(ProviderError::Timeout.into()),
		}

		if let Some(token) = self.cache.load(&self.identity.account) {
			debug!(
				target = "farm.session",
				account = self.identity.account,
				"attempting token relogin"
			);
			let mut request = LogOnRequest::new(&self.identity.account);
			request.session_token = Some(token);
			match self.log_on_once(request).await {
				Ok(outcome) => return self.conclude_logon(outcome).await,
				Err(FarmError::Provider(ProviderError::InvalidSessionToken)) => {
					info!(
						target = "farm.session",
						account = self.identity.account,
						"cached session token rejected; using credentials"
					);
					self.cache.clear(&self.identity.account);
				}
				Err(err) => return Err(err),
			}
		}

		let mut request = LogOnRequest::new(&self.identity.account);
		request.password = self.identity.password.clone();
		request.otp_seed = self.identity.otp_seed.clone();
		let outcome = self.log_on_once(request).await?;
		self.conclude_logon(outcome).await
	}

	async fn log_on_once(&self, request: LogOnRequest) -> Result<LogOnOutcome> {
		match time::timeout(self.config.login_timeout, self.provider.log_on(request)).await {
			Ok(Ok(outcome)) => Ok(outcome),
			Ok(Err(err)) => Err(classify(err)),
			Err(_) => Err(ProviderError::Timeout.into()),
		}
	}

	async fn conclude_logon(&self, outcome: LogOnOutcome) -> Result<()> {
		match outcome {
			LogOnOutcome::LoggedOn {
				info,
				session_token,
			} => self.on_logged_on(info, session_token).await,
			LogOnOutcome::ChallengeRequired {
				domain_hint,
				last_code_wrong,
			} => self.await_challenge(domain_hint, last_code_wrong).await,
		}
	}

	/// Suspends the login flow until a code arrives, the window closes, or
	/// farming stops. A wrong code re-enters the same wait.
	async fn await_challenge(
		&self,
		mut domain_hint: Option<String>,
		mut last_code_wrong: bool,
	) -> Result<()> {
		loop {
			self.set_phase(SessionPhase::ChallengeRequired);
			self.bus.publish(&FarmEvent::ChallengeRequired {
				account: self.identity.account.clone(),
				domain_hint: domain_hint.clone(),
				last_code_wrong,
			});
			info!(
				target = "farm.session",
				account = self.identity.account,
				last_code_wrong,
				"waiting for challenge code"
			);

			let code = {
				let mut codes = self.codes_rx.lock().await;
				tokio::select! {
					_ = self.stop.cancelled() => return Ok(()),
					received = time::timeout(self.config.challenge_timeout, codes.recv()) => {
						match received {
							Ok(Some(code)) => code,
							Ok(None) | Err(_) => return Err(FarmError::ChallengeTimeout),
						}
					}
				}
			};

			let outcome =
				match time::timeout(self.config.login_timeout, self.provider.submit_code(&code))
					.await
				{
					Ok(Ok(outcome)) => outcome,
					Ok(Err(err)) => return Err(classify(err)),
					Err(_) => return Err(ProviderError::Timeout.into()),
				};

			match outcome {
				LogOnOutcome::LoggedOn {
					info,
					session_token,
				} => return self.on_logged_on(info, session_token).await,
				LogOnOutcome::ChallengeRequired {
					domain_hint: hint,
					last_code_wrong: wrong,
				} => {
					domain_hint = hint;
					last_code_wrong = wrong;
				}
			}
		}
	}

	async fn on_logged_on(&self, info: AccountInfo, session_token: Option<String>) -> Result<()> {
		if let Some(token) = &session_token {
			self.cache.save(&self.identity.account, token);
		}
		// The supervisor resets itself (attempt counter back to zero) when
		// the relogin closure returns success; nothing to cancel here.
		self.set_phase(SessionPhase::LoggedOn);
		self.bus.publish(&FarmEvent::LoggedOn {
			account: self.identity.account.clone(),
		});
		info!(
			target = "farm.session",
			account = self.identity.account,
			display_name = info.display_name.as_deref().unwrap_or(""),
			"logged on"
		);

		let ids = self.activity_ids();
		self.accumulator.lock().begin(&ids);
		self.rebroadcast().await?;
		self.provider.set_presence_state(PresenceState::Online).await?;
		Ok(())
	}

	async fn handle_provider_event(self: &Arc<Self>, event: ProviderEvent) {
		match event {
			ProviderEvent::Connected => {
				debug!(
					target = "farm.session",
					account = self.identity.account,
					"transport connected"
				);
			}
			// The log-on call's return value already drove the transition.
			ProviderEvent::LoggedOn(_) => {}
			ProviderEvent::ChallengeRequired { .. } => {
				debug!(
					target = "farm.session",
					account = self.identity.account,
					"challenge event outside a login flow; resolved at next relogin"
				);
			}
			ProviderEvent::Fault { message } => {
				warn!(
					target = "farm.session",
					account = self.identity.account,
					message,
					"provider fault"
				);
				self.bus.publish(&FarmEvent::Error {
					account: self.identity.account.clone(),
					message,
				});
			}
			ProviderEvent::Disconnected(reason) => self.handle_disconnect(reason).await,
		}
	}

	async fn handle_disconnect(self: &Arc<Self>, reason: DisconnectReason) {
		// Checkpoint before anything else so disconnected wall time is
		// never counted.
		self.accumulator.lock().suspend();
		self.announce_disconnect(&reason);

		if self.stop.is_cancelled() {
			debug!(
				target = "farm.session",
				account = self.identity.account,
				"stopping; session drop not retried"
			);
			return;
		}
		self.supervisor.record_disconnect(reason.to_string());
		self.begin_reconnect();
	}

	fn announce_disconnect(&self, reason: &DisconnectReason) {
		self.set_phase(SessionPhase::Disconnected);
		warn!(
			target = "farm.session",
			account = self.identity.account,
			reason = %reason,
			"session dropped"
		);
		self.bus.publish(&FarmEvent::Disconnected {
			account: self.identity.account.clone(),
			reason: reason.to_string(),
		});
	}

	fn begin_reconnect(self: &Arc<Self>) {
		self.set_phase(SessionPhase::Reconnecting);
		let inner = Arc::clone(self);
		self.supervisor.start_reconnect(move |_attempt| {
			let inner = Arc::clone(&inner);
			async move {
				if inner.stop.is_cancelled() {
					return Err(RetryError::Retry("stopped".to_string()));
				}
				inner.login().await.map_err(|err| {
					if err.is_transient() {
						RetryError::Retry(err.to_string())
					} else {
						RetryError::Fatal(err.to_string())
					}
				})
			}
		});
	}

	/// Checkpoint, evaluate targets, trim completed activities. Breaks when
	/// the broadcast set runs dry.
	async fn on_tick(&self) -> ControlFlow<()> {
		if self.phase() != SessionPhase::LoggedOn {
			return ControlFlow::Continue(());
		}

		let completed: Vec<CompletedActivity> = {
			let mut accumulator = self.accumulator.lock();
			accumulator.checkpoint();
			let done = accumulator.completed(&self.targets);
			if done.is_empty() {
				Vec::new()
			} else {
				let mut activities = self.activities.lock();
				let mut echoes = Vec::with_capacity(done.len());
				for id in &done {
					let Some(index) = activities.iter().position(|a| a.id == *id) else {
						continue;
					};
					echoes.push(CompletedActivity {
						account: self.identity.account.clone(),
						entry: activities.remove(index),
						total_secs: accumulator.committed_secs(*id),
					});
				}
				accumulator.drop_activities(&done);
				echoes
			}
		};

		if completed.is_empty() {
			return ControlFlow::Continue(());
		}

		for done in &completed {
			info!(
				target = "farm.session",
				account = self.identity.account,
				activity = done.entry.id,
				hours = done.total_secs / 3600.0,
				"target reached; activity dropped"
			);
			if let Some(sink) = self.completions.lock().as_ref() {
				let _ = sink.send(done.clone());
			}
		}

		if self.activities.lock().is_empty() {
			info!(
				target = "farm.session",
				account = self.identity.account,
				"all targets reached"
			);
			return ControlFlow::Break(());
		}

		if let Err(err) = self.rebroadcast().await {
			warn!(
				target = "farm.session",
				account = self.identity.account,
				error = %err,
				"failed to rebroadcast trimmed activity set"
			);
		}
		ControlFlow::Continue(())
	}

	/// Final bookkeeping for `run`: teardown on a normal end, failure
	/// surfacing otherwise.
	async fn conclude(&self, result: Result<()>) -> Result<()> {
		match result {
			Ok(()) => {
				self.teardown().await;
				Ok(())
			}
			Err(err) => {
				self.accumulator.lock().suspend();
				self.set_phase(SessionPhase::Failed);
				if !matches!(err, FarmError::ReconnectExhausted { .. }) {
					// Exhaustion was already announced by the supervisor.
					self.bus.publish(&FarmEvent::Error {
						account: self.identity.account.clone(),
						message: err.to_string(),
					});
				}
				warn!(
					target = "farm.session",
					account = self.identity.account,
					error = %err,
					"farming ended with a failure"
				);
				self.provider.disconnect().await;
				Err(err)
			}
		}
	}

	async fn teardown(&self) {
		// Concurrent callers (an external `stop` racing the run loop's own
		// exit) block here until the one real teardown has finished.
		let mut done = self.teardown_done.lock().await;
		if *done {
			return;
		}

		self.supervisor.stop_reconnect();
		self.accumulator.lock().suspend();

		if self.phase() == SessionPhase::LoggedOn {
			if let Err(err) = self.provider.set_activities(&[]).await {
				debug!(
					target = "farm.session",
					account = self.identity.account,
					error = %err,
					"could not clear activity broadcast"
				);
			}
			if let Err(err) = self.provider.set_presence_state(PresenceState::Offline).await {
				debug!(
					target = "farm.session",
					account = self.identity.account,
					error = %err,
					"could not go offline"
				);
			}
		}
		self.provider.disconnect().await;

		self.set_phase(SessionPhase::LoggedOut);
		info!(
			target = "farm.session",
			account = self.identity.account,
			"farming stopped"
		);
		*done = true;
	}
}

fn classify(err: ProviderError) -> FarmError {
	match err {
		ProviderError::AuthRejected(message) => FarmError::AuthRejected(message),
		ProviderError::RateLimited(message) => FarmError::RateLimited(message),
		other => FarmError::Provider(other),
	}
}
