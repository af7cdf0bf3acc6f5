use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Backend rate limit exceeded.")]
	RateLimited { retry_after: Option<Duration> },
	#[error("Backend returned HTTP {status}: {body}")]
	Status { status: u16, body: String },
	#[error("Backend call timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
}
impl Error {
	/// Transient failures worth another attempt under the retry policy.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::RateLimited { .. } | Self::Timeout { .. } => true,
			Self::Status { status, .. } => *status == 408 || *status >= 500,
			Self::Reqwest(err) => err.is_timeout() || err.is_connect(),
			_ => false,
		}
	}

	/// The backend could not be reached or kept refusing service.
	///
	/// Malformed payloads are not unavailability; callers fall back on those instead.
	pub fn is_unavailable(&self) -> bool {
		match self {
			Self::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request(),
			Self::Status { status, .. } => matches!(*status, 401 | 403 | 408) || *status >= 500,
			_ => self.is_retryable(),
		}
	}
}
