use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] sift_config::Error),
	#[error(transparent)]
	Service(#[from] sift_service::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Failed to write results to {path:?}.")]
	WriteOutput {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}
impl Error {
	pub fn exit_code(&self) -> u8 {
		match self {
			Self::Config(_) | Self::Service(sift_service::Error::InvalidRequest { .. }) => 2,
			Self::Service(err) if err.is_backend_unavailable() => 4,
			Self::Service(_) | Self::SerdeJson(_) | Self::WriteOutput { .. } => 3,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_follow_failure_class() {
		let config = Error::Config(sift_config::Error::Validation {
			message: "ranking weights must sum to 1.0.".to_string(),
		});
		let unavailable = Error::Service(sift_service::Error::Analysis {
			message: "HTTP 503".to_string(),
		});
		let empty = Error::Service(sift_service::Error::Retrieval {
			message: "No snippets.".to_string(),
			unavailable: false,
		});
		let invalid = Error::Service(sift_service::Error::InvalidRequest {
			message: "query must be non-empty.".to_string(),
		});

		assert_eq!(config.exit_code(), 2);
		assert_eq!(invalid.exit_code(), 2);
		assert_eq!(unavailable.exit_code(), 4);
		assert_eq!(empty.exit_code(), 3);
	}
}
