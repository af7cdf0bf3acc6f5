pub mod aggregate;
pub mod analyze;
pub mod context;
pub mod diagnostics;
pub mod judge;
pub mod model;
pub mod pipeline;
pub mod rank;
pub mod rephrase;
pub mod retrieve;
pub mod text;
pub mod time_serde;

mod error;

pub use context::SearchContext;
pub use diagnostics::{Diagnostic, Diagnostics, FailureKind, Stage};
pub use error::{Error, Result};
pub use model::{
	AnalysisResult, Candidate, Criterion, Intent, JudgedPaper, Paper, PaperMetadata, RankedResult,
	RelevanceLabel, RephrasedQuerySet, RetrievalMethod, SearchRequest, Snippet,
};
pub use pipeline::{PipelineState, SearchResponse, SearchStats};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use sift_config::Config;
use sift_providers::{LlmClient, RetryPolicy, ScholarClient, SearchFilters, SearchHit, SearchMode};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTask {
	Analyze,
	Rephrase,
	Judge,
}
impl LlmTask {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Analyze => "analyze",
			Self::Rephrase => "rephrase",
			Self::Judge => "judge",
		}
	}
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
	pub task: LlmTask,
	pub messages: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct PaperQuery {
	pub text: String,
	pub mode: SearchMode,
	pub limit: u32,
	pub filters: SearchFilters,
}

pub trait LanguageModel
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		request: &'a CompletionRequest,
	) -> BoxFuture<'a, sift_providers::Result<Value>>;
}

pub trait PaperSearch
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a PaperQuery,
	) -> BoxFuture<'a, sift_providers::Result<Vec<SearchHit>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub llm: Arc<dyn LanguageModel>,
	pub search: Arc<dyn PaperSearch>,
}
impl Providers {
	pub fn new(llm: Arc<dyn LanguageModel>, search: Arc<dyn PaperSearch>) -> Self {
		Self { llm, search }
	}

	/// HTTP-backed providers sharing one retry policy built from `[retry]`.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let retry = RetryPolicy::from_config(&cfg.retry);
		let llm = LlmClient::new(&cfg.providers.llm, retry.clone())?;
		let search = ScholarClient::new(&cfg.providers.search, retry)?;

		Ok(Self { llm: Arc::new(DefaultLlm(llm)), search: Arc::new(DefaultSearch(search)) })
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub providers: Providers,
}
impl SiftService {
	pub fn new(cfg: Config) -> Result<Self> {
		let providers = Providers::from_config(&cfg)?;

		Ok(Self { cfg, providers })
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		Self { cfg, providers }
	}
}

struct DefaultLlm(LlmClient);
impl LanguageModel for DefaultLlm {
	fn complete<'a>(
		&'a self,
		request: &'a CompletionRequest,
	) -> BoxFuture<'a, sift_providers::Result<Value>> {
		Box::pin(async move {
			tracing::debug!(
				provider = self.0.provider_id(),
				task = request.task.as_str(),
				"Language model request."
			);

			self.0.complete(&request.messages).await
		})
	}
}

struct DefaultSearch(ScholarClient);
impl PaperSearch for DefaultSearch {
	fn search<'a>(
		&'a self,
		query: &'a PaperQuery,
	) -> BoxFuture<'a, sift_providers::Result<Vec<SearchHit>>> {
		Box::pin(self.0.search(&query.text, query.mode, query.limit, &query.filters))
	}
}
