use idlefarm_provider::ProviderError;
use thiserror::Error;

/// Errors surfaced by the resilience and accounting layer.
#[derive(Debug, Error)]
pub enum FarmError {
	/// Credentials were rejected outright; never retried automatically.
	#[error("authentication rejected: {0}")]
	AuthRejected(String),

	/// Provider asked for a cool-down; terminal for the attempt cycle and
	/// reported distinctly so the caller can back off account-level.
	#[error("rate limited: {0}")]
	RateLimited(String),

	/// No second-factor code arrived before the challenge window closed.
	#[error("challenge code not supplied in time")]
	ChallengeTimeout,

	/// The supervisor burned through its retry budget.
	#[error("gave up reconnecting after {attempts} attempts: {reason}")]
	ReconnectExhausted { attempts: u32, reason: String },

	#[error(transparent)]
	Provider(#[from] ProviderError),
}

impl FarmError {
	/// True when the failure is worth routing through the reconnection
	/// supervisor rather than surfacing as terminal.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Provider(err) => err.is_transient(),
			Self::ChallengeTimeout => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, FarmError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn provider_transience_is_forwarded() {
		assert!(FarmError::from(ProviderError::Timeout).is_transient());
		assert!(!FarmError::from(ProviderError::AuthRejected("no".into())).is_transient());
		assert!(FarmError::ChallengeTimeout.is_transient());
		assert!(
			!FarmError::ReconnectExhausted {
				attempts: 5,
				reason: "link down".into()
			}
			.is_transient()
		);
	}
}
