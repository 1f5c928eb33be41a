//! Wire-facing types exchanged with a session provider.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One trackable activity an account reports as currently active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

impl ActivityEntry {
	pub fn new(id: u32) -> Self {
		Self { id, label: None }
	}

	pub fn labeled(id: u32, label: impl Into<String>) -> Self {
		Self {
			id,
			label: Some(label.into()),
		}
	}
}

impl fmt::Display for ActivityEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.label {
			Some(label) => write!(f, "{} ({})", label, self.id),
			None => write!(f, "{}", self.id),
		}
	}
}

/// Presence visibility reported alongside the activity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
	#[default]
	Online,
	Invisible,
	Away,
	Offline,
}

/// Credentials and reuse material for one log-on attempt.
///
/// A cached `session_token` short-circuits the credential flow; `otp_seed`
/// lets the provider derive second-factor codes without interactive entry.
#[derive(Debug, Clone, Default)]
pub struct LogOnRequest {
	pub account: String,
	pub password: Option<String>,
	pub session_token: Option<String>,
	pub otp_seed: Option<String>,
	pub one_time_code: Option<String>,
}

impl LogOnRequest {
	pub fn new(account: impl Into<String>) -> Self {
		Self {
			account: account.into(),
			..Default::default()
		}
	}
}

/// Provider-reported identity of a logged-on account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
	pub account: String,
	pub display_name: Option<String>,
}

/// Result of a log-on attempt that did not fail outright.
#[derive(Debug, Clone)]
pub enum LogOnOutcome {
	LoggedOn {
		info: AccountInfo,
		/// Fresh reusable token, when the provider issued one.
		session_token: Option<String>,
	},
	/// A second-factor code is needed before the session can come up.
	ChallengeRequired {
		domain_hint: Option<String>,
		last_code_wrong: bool,
	},
}

/// Why the provider dropped the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
	pub code: i32,
	pub text: String,
}

impl DisconnectReason {
	pub fn new(code: i32, text: impl Into<String>) -> Self {
		Self {
			code,
			text: text.into(),
		}
	}
}

impl fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (code {})", self.text, self.code)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn activity_entry_serializes_without_empty_label() {
		let bare = serde_json::to_string(&ActivityEntry::new(730)).unwrap();
		assert_eq!(bare, r#"{"id":730}"#);

		let labeled = serde_json::to_string(&ActivityEntry::labeled(440, "TF2")).unwrap();
		assert_eq!(labeled, r#"{"id":440,"label":"TF2"}"#);
	}

	#[test]
	fn presence_state_uses_lowercase_wire_names() {
		assert_eq!(serde_json::to_string(&PresenceState::Invisible).unwrap(), r#""invisible""#);
		let parsed: PresenceState = serde_json::from_str(r#""offline""#).unwrap();
		assert_eq!(parsed, PresenceState::Offline);
	}

	#[test]
	fn disconnect_reason_display_carries_code() {
		let reason = DisconnectReason::new(3, "remote host closed the link");
		assert_eq!(reason.to_string(), "remote host closed the link (code 3)");
	}
}
