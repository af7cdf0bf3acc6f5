use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Analyze,
	Rephrase,
	Retrieve,
	Aggregate,
	Judge,
	Rank,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Analyze => "analyze",
			Self::Rephrase => "rephrase",
			Self::Retrieve => "retrieve",
			Self::Aggregate => "aggregate",
			Self::Judge => "judge",
			Self::Rank => "rank",
		}
	}
}
impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	BackendUnavailable,
	RateLimited,
	InvalidResponse,
	Timeout,
	Cancelled,
	Panicked,
	Empty,
}
impl FailureKind {
	pub fn from_provider(err: &sift_providers::Error) -> Self {
		match err {
			sift_providers::Error::RateLimited { .. } => Self::RateLimited,
			sift_providers::Error::Timeout { .. } => Self::Timeout,
			err if err.is_unavailable() => Self::BackendUnavailable,
			_ => Self::InvalidResponse,
		}
	}
}

/// One recoverable failure recorded while the search kept going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
	pub stage: Stage,
	pub kind: FailureKind,
	/// Phrasing, canonical id, or other handle naming what failed.
	pub entity: Option<String>,
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
	entries: Vec<Diagnostic>,
}
impl Diagnostics {
	pub fn push(
		&mut self,
		stage: Stage,
		kind: FailureKind,
		entity: Option<String>,
		message: impl Into<String>,
	) {
		let message = message.into();

		tracing::warn!(
			stage = stage.as_str(),
			kind = ?kind,
			entity = entity.as_deref().unwrap_or(""),
			message = %message,
			"Search stage degraded."
		);

		self.entries.push(Diagnostic { stage, kind, entity, message });
	}

	pub fn extend(&mut self, other: Diagnostics) {
		self.entries.extend(other.entries);
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn count_for(&self, stage: Stage) -> usize {
		self.entries.iter().filter(|entry| entry.stage == stage).count()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
		self.entries.iter()
	}
}
