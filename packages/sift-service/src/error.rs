use crate::diagnostics::Stage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Query analysis failed: {message}")]
	Analysis { message: String },
	#[error("Retrieval failed: {message}")]
	Retrieval { message: String, unavailable: bool },
	#[error("Search deadline exceeded during {stage}.")]
	Timeout { stage: Stage },
	#[error("Provider error: {message}")]
	Provider { message: String },
}
impl Error {
	pub fn stage(&self) -> Option<Stage> {
		match self {
			Self::Analysis { .. } => Some(Stage::Analyze),
			Self::Retrieval { .. } => Some(Stage::Retrieve),
			Self::Timeout { stage } => Some(*stage),
			Self::InvalidRequest { .. } | Self::Provider { .. } => None,
		}
	}

	/// The run failed because a backend could not be reached rather than because of bad data.
	pub fn is_backend_unavailable(&self) -> bool {
		matches!(self, Self::Analysis { .. } | Self::Retrieval { unavailable: true, .. })
	}
}
impl From<sift_providers::Error> for Error {
	fn from(err: sift_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
