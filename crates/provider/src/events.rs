use crate::types::{AccountInfo, DisconnectReason};

/// Asynchronous happenings pushed by the provider outside of any call.
///
/// Delivered over the channel handed out by
/// [`SessionProvider::subscribe`](crate::SessionProvider::subscribe); a single
/// consumer (the account's orchestrator) drains it.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
	/// Transport established.
	Connected,
	/// Session came up (also mirrored by the log-on call's return value).
	LoggedOn(AccountInfo),
	/// A second-factor code became necessary mid-flow.
	ChallengeRequired {
		domain_hint: Option<String>,
		last_code_wrong: bool,
	},
	/// Session dropped; the reason decides whether a retry is worthwhile.
	Disconnected(DisconnectReason),
	/// Non-fatal provider-side fault, informational only.
	Fault { message: String },
}
