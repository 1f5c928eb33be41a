//! Typed publish/subscribe registry.
//!
//! Decouples the lifecycle machinery from presentation code: the supervisor
//! and orchestrator publish, anything interested subscribes. Dispatch is
//! synchronous, in subscription order, on the calling task; a panicking
//! handler is isolated and logged so it cannot abort dispatch to the rest.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::error;

/// Event tags the bus dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Connecting,
	ChallengeRequired,
	LoggedOn,
	Disconnected,
	Reconnecting,
	Reconnected,
	ReconnectFailed,
	Error,
}

/// Payloads published on the bus. Every variant names its account so fleet
/// subscribers can tell interleaved streams apart.
#[derive(Debug, Clone)]
pub enum FarmEvent {
	Connecting {
		account: String,
	},
	ChallengeRequired {
		account: String,
		domain_hint: Option<String>,
		last_code_wrong: bool,
	},
	LoggedOn {
		account: String,
	},
	Disconnected {
		account: String,
		reason: String,
	},
	Reconnecting {
		account: String,
		attempt: u32,
		max_attempts: u32,
		delay: Duration,
	},
	Reconnected {
		account: String,
	},
	ReconnectFailed {
		account: String,
		reason: String,
	},
	Error {
		account: String,
		message: String,
	},
}

impl FarmEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			Self::Connecting { .. } => EventKind::Connecting,
			Self::ChallengeRequired { .. } => EventKind::ChallengeRequired,
			Self::LoggedOn { .. } => EventKind::LoggedOn,
			Self::Disconnected { .. } => EventKind::Disconnected,
			Self::Reconnecting { .. } => EventKind::Reconnecting,
			Self::Reconnected { .. } => EventKind::Reconnected,
			Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
			Self::Error { .. } => EventKind::Error,
		}
	}

	pub fn account(&self) -> &str {
		match self {
			Self::Connecting { account }
			| Self::ChallengeRequired { account, .. }
			| Self::LoggedOn { account }
			| Self::Disconnected { account, .. }
			| Self::Reconnecting { account, .. }
			| Self::Reconnected { account }
			| Self::ReconnectFailed { account, .. }
			| Self::Error { account, .. } => account,
		}
	}
}

type Handler = Arc<dyn Fn(&FarmEvent) + Send + Sync>;

/// Per-orchestrator event bus.
#[derive(Default)]
pub struct EventBus {
	handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
	next_id: AtomicU64,
}

impl EventBus {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Registers `handler` for `kind`. The returned handle removes it again;
	/// dropping the handle without calling it leaves the subscription alive.
	pub fn subscribe(
		self: &Arc<Self>,
		kind: EventKind,
		handler: impl Fn(&FarmEvent) + Send + Sync + 'static,
	) -> Subscription {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.handlers
			.lock()
			.entry(kind)
			.or_default()
			.push((id, Arc::new(handler)));
		Subscription {
			bus: Arc::downgrade(self),
			kind,
			id,
		}
	}

	/// Dispatches `event` to all handlers of its kind, in subscription order.
	///
	/// The handler list is snapshotted first, so handlers may subscribe or
	/// unsubscribe reentrantly; such changes take effect from the next
	/// publish.
	pub fn publish(&self, event: &FarmEvent) {
		let snapshot: Vec<Handler> = {
			let handlers = self.handlers.lock();
			match handlers.get(&event.kind()) {
				Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
				None => return,
			}
		};

		for handler in snapshot {
			if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
				error!(
					target = "farm.bus",
					account = event.account(),
					kind = ?event.kind(),
					"event handler panicked; continuing dispatch"
				);
			}
		}
	}

	/// Drops every handler registered for `kind`.
	pub fn clear(&self, kind: EventKind) {
		self.handlers.lock().remove(&kind);
	}

	pub fn has_subscribers(&self, kind: EventKind) -> bool {
		self.handlers
			.lock()
			.get(&kind)
			.is_some_and(|entries| !entries.is_empty())
	}

	fn remove(&self, kind: EventKind, id: u64) {
		let mut handlers = self.handlers.lock();
		if let Some(entries) = handlers.get_mut(&kind) {
			entries.retain(|(entry_id, _)| *entry_id != id);
			if entries.is_empty() {
				handlers.remove(&kind);
			}
		}
	}
}

/// Removal handle returned by [`EventBus::subscribe`].
pub struct Subscription {
	bus: Weak<EventBus>,
	kind: EventKind,
	id: u64,
}

impl Subscription {
	/// Removes the handler. Safe to call more than once.
	pub fn unsubscribe(&self) {
		if let Some(bus) = self.bus.upgrade() {
			bus.remove(self.kind, self.id);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	fn logged_on(account: &str) -> FarmEvent {
		FarmEvent::LoggedOn {
			account: account.into(),
		}
	}

	#[test]
	fn dispatch_runs_in_subscription_order() {
		let bus = EventBus::new();
		let order = Arc::new(Mutex::new(Vec::new()));

		for tag in ["first", "second", "third"] {
			let order = Arc::clone(&order);
			bus.subscribe(EventKind::LoggedOn, move |_| order.lock().push(tag));
		}

		bus.publish(&logged_on("a"));
		assert_eq!(*order.lock(), vec!["first", "second", "third"]);
	}

	#[test]
	fn unsubscribe_is_idempotent() {
		let bus = EventBus::new();
		let hits = Arc::new(AtomicUsize::new(0));

		let counter = Arc::clone(&hits);
		let sub = bus.subscribe(EventKind::LoggedOn, move |_| {
			counter.fetch_add(1, Ordering::Relaxed);
		});

		bus.publish(&logged_on("a"));
		sub.unsubscribe();
		sub.unsubscribe();
		bus.publish(&logged_on("a"));

		assert_eq!(hits.load(Ordering::Relaxed), 1);
		assert!(!bus.has_subscribers(EventKind::LoggedOn));
	}

	#[test]
	fn panicking_handler_does_not_stop_dispatch() {
		let bus = EventBus::new();
		let hits = Arc::new(AtomicUsize::new(0));

		bus.subscribe(EventKind::LoggedOn, |_| panic!("handler bug"));
		let counter = Arc::clone(&hits);
		bus.subscribe(EventKind::LoggedOn, move |_| {
			counter.fetch_add(1, Ordering::Relaxed);
		});

		bus.publish(&logged_on("a"));
		assert_eq!(hits.load(Ordering::Relaxed), 1);
	}

	#[test]
	fn handlers_may_resubscribe_during_dispatch() {
		let bus = EventBus::new();
		let hits = Arc::new(AtomicUsize::new(0));

		let reentrant = Arc::clone(&bus);
		let counter = Arc::clone(&hits);
		bus.subscribe(EventKind::Disconnected, move |_| {
			let counter = Arc::clone(&counter);
			reentrant.subscribe(EventKind::Reconnected, move |_| {
				counter.fetch_add(1, Ordering::Relaxed);
			});
		});

		bus.publish(&FarmEvent::Disconnected {
			account: "a".into(),
			reason: "drop".into(),
		});
		bus.publish(&FarmEvent::Reconnected { account: "a".into() });

		assert_eq!(hits.load(Ordering::Relaxed), 1);
	}

	#[test]
	fn clear_drops_all_handlers_of_a_kind() {
		let bus = EventBus::new();
		bus.subscribe(EventKind::Error, |_| {});
		bus.subscribe(EventKind::Error, |_| {});
		assert!(bus.has_subscribers(EventKind::Error));

		bus.clear(EventKind::Error);
		assert!(!bus.has_subscribers(EventKind::Error));
	}
}
