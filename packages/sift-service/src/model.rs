use std::fmt;

use serde::{Deserialize, Serialize};

use crate::text;
use sift_providers::SearchFilters;

/// One search invocation as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub max_results: Option<u32>,
	#[serde(default)]
	pub filters: Option<SearchFilters>,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>) -> Self {
		Self { query: query.into(), max_results: None, filters: None }
	}

	pub fn with_max_results(mut self, max_results: u32) -> Self {
		self.max_results = Some(max_results);

		self
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
	#[default]
	BroadSemantic,
	SpecificByTitle,
	SpecificByName,
	PureMetadata,
	CitingPapers,
}
impl Intent {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::BroadSemantic => "BROAD_SEMANTIC",
			Self::SpecificByTitle => "SPECIFIC_BY_TITLE",
			Self::SpecificByName => "SPECIFIC_BY_NAME",
			Self::PureMetadata => "PURE_METADATA",
			Self::CitingPapers => "CITING_PAPERS",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
	pub description: String,
	pub weight: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
	pub intent: Intent,
	/// Topic of the query with metadata phrasing removed; drives rephrasing and retrieval.
	pub content_query: String,
	pub filters: SearchFilters,
	/// Distinct, non-empty, in backend order.
	pub criteria: Vec<Criterion>,
	pub authors: Vec<String>,
	pub domains: Vec<String>,
	/// Switches the recency term on when `ranking.recency_on_request` is set.
	pub recent_first: bool,
	/// Reported only; ranking weights are not adjusted for it.
	pub central_first: bool,
	/// True when the backend answer was unusable and the synthetic criterion was substituted.
	pub fallback: bool,
}
impl AnalysisResult {
	pub fn fallback(query: &str) -> Self {
		Self {
			intent: Intent::BroadSemantic,
			content_query: query.trim().to_string(),
			filters: SearchFilters::default(),
			criteria: vec![Criterion { description: query.trim().to_string(), weight: 1.0 }],
			authors: Vec::new(),
			domains: Vec::new(),
			recent_first: false,
			central_first: false,
			fallback: true,
		}
	}
}

/// Ordered, distinct phrasings with the caller's query always at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RephrasedQuerySet {
	queries: Vec<String>,
}
impl RephrasedQuerySet {
	pub fn new(original: &str) -> Self {
		Self { queries: vec![original.trim().to_string()] }
	}

	/// Adds `candidate` unless it is blank or matches an existing phrasing after normalization.
	pub fn push(&mut self, candidate: &str) -> bool {
		let trimmed = candidate.trim();

		if trimmed.is_empty() {
			return false;
		}

		let key = text::normalize_query_key(trimmed);

		if self.queries.iter().any(|existing| text::normalize_query_key(existing) == key) {
			return false;
		}

		self.queries.push(trimmed.to_string());

		true
	}

	pub fn original(&self) -> &str {
		&self.queries[0]
	}

	pub fn as_slice(&self) -> &[String] {
		&self.queries
	}

	pub fn len(&self) -> usize {
		self.queries.len()
	}

	pub fn is_empty(&self) -> bool {
		false
	}

	pub fn rephrasings(&self) -> usize {
		self.queries.len() - 1
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
	Semantic,
	Keyword,
	Hybrid,
}
impl RetrievalMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Semantic => "semantic",
			Self::Keyword => "keyword",
			Self::Hybrid => "hybrid",
		}
	}
}
impl fmt::Display for RetrievalMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
	pub source_query: String,
	/// Position of `source_query` in the phrasing set.
	pub query_index: usize,
	pub paper_ref: Option<String>,
	pub text: String,
	pub retrieval_score: f32,
	pub retrieval_method: RetrievalMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
	pub title: String,
	pub authors: Vec<String>,
	pub year: Option<i32>,
	pub citation_count: Option<u64>,
	pub abstract_text: Option<String>,
	pub url: Option<String>,
}

/// A snippet together with the paper metadata its backend hit carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub snippet: Snippet,
	pub metadata: PaperMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paper {
	pub canonical_id: String,
	pub title: String,
	pub authors: Vec<String>,
	pub year: Option<i32>,
	pub citation_count: Option<u64>,
	#[serde(rename = "abstract")]
	pub abstract_text: Option<String>,
	pub url: Option<String>,
	pub snippets: Vec<Snippet>,
	pub best_retrieval_score: f32,
	/// Distinct phrasings that found the paper, in phrasing-set order.
	pub queries: Vec<String>,
	pub retrieval_methods: Vec<RetrievalMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgedPaper {
	#[serde(flatten)]
	pub paper: Paper,
	pub relevance_score: f32,
	pub rationale: String,
	pub judged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceLabel {
	HighlyRelevant,
	Relevant,
	SomewhatRelevant,
	NotRelevant,
}
impl RelevanceLabel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HighlyRelevant => "highly_relevant",
			Self::Relevant => "relevant",
			Self::SomewhatRelevant => "somewhat_relevant",
			Self::NotRelevant => "not_relevant",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
	pub rank: u32,
	pub final_score: f32,
	pub citation_term: f32,
	pub recency_term: f32,
	pub label: RelevanceLabel,
	#[serde(flatten)]
	pub judged: JudgedPaper,
}
impl RankedResult {
	pub fn paper(&self) -> &Paper {
		&self.judged.paper
	}
}
