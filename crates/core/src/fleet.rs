//! Concurrent multi-account farming.
//!
//! One independently supervised orchestrator task per configured account.
//! Starts are staggered to avoid provider-side burst throttling; a failure
//! in one account never touches the others.

use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use crate::orchestrator::SessionOrchestrator;

/// Launches and shuts down a set of account orchestrators.
pub struct FleetRunner {
	orchestrators: Vec<SessionOrchestrator>,
	stagger: Duration,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FleetRunner {
	/// Delay between consecutive account starts when more than one account
	/// is configured.
	pub const DEFAULT_STAGGER: Duration = Duration::from_secs(2);

	pub fn new(orchestrators: Vec<SessionOrchestrator>, stagger: Duration) -> Self {
		Self {
			orchestrators,
			stagger,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn orchestrators(&self) -> &[SessionOrchestrator] {
		&self.orchestrators
	}

	pub fn find(&self, account: &str) -> Option<&SessionOrchestrator> {
		self.orchestrators
			.iter()
			.find(|orchestrator| orchestrator.account() == account)
	}

	/// Spawns one task per account, staggered by the configured delay.
	pub async fn start(&self) {
		let mut spawned = Vec::with_capacity(self.orchestrators.len());
		for (index, orchestrator) in self.orchestrators.iter().enumerate() {
			if index > 0 {
				time::sleep(self.stagger).await;
			}
			info!(
				target = "farm.fleet",
				account = orchestrator.account(),
				"starting session"
			);
			let orchestrator = orchestrator.clone();
			let account = orchestrator.account().to_string();
			spawned.push(tokio::spawn(async move {
				if let Err(err) = orchestrator.run().await {
					warn!(
						target = "farm.fleet",
						account,
						error = %err,
						"account ended with a failure"
					);
				}
			}));
		}
		self.handles.lock().extend(spawned);
	}

	/// Waits until every account task has finished.
	pub async fn wait(&self) {
		let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
		for result in join_all(handles).await {
			if let Err(err) = result {
				warn!(target = "farm.fleet", error = %err, "account task panicked");
			}
		}
	}

	/// Requests `stop` on every account, concurrently, and waits for all
	/// tasks to reach logged-out before returning.
	pub async fn shutdown(&self) {
		info!(target = "farm.fleet", "stopping all accounts");
		join_all(
			self.orchestrators
				.iter()
				.map(|orchestrator| orchestrator.stop()),
		)
		.await;
		self.wait().await;
	}
}
