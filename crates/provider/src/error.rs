use thiserror::Error;

/// Failures surfaced by a session provider.
///
/// The resilience layer keys its retry decision off this taxonomy: transient
/// variants go through the reconnection supervisor, everything else is
/// terminal for the attempt cycle.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
	#[error("network failure: {0}")]
	Network(String),

	#[error("provider did not respond in time")]
	Timeout,

	#[error("provider transport is not connected")]
	NotConnected,

	#[error("cached session token was rejected")]
	InvalidSessionToken,

	#[error("authentication rejected: {0}")]
	AuthRejected(String),

	#[error("rate limited by provider: {0}")]
	RateLimited(String),
}

impl ProviderError {
	/// True for failures worth retrying at the connection level.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network(_) | Self::Timeout | Self::NotConnected)
	}
}

pub type Result<T> = std::result::Result<T, ProviderError>;
