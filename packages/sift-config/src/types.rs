use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub rephrase: Rephrase,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub aggregation: Aggregation,
	#[serde(default)]
	pub judge: Judge,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub llm: LlmProviderConfig,
	pub search: SearchProviderConfig,
}

/// OpenAI-compatible chat completions endpoint used for analysis, rephrasing, and judgement.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// Left empty when `api_key_env` names the variable holding the key.
	#[serde(default)]
	pub api_key: String,
	pub api_key_env: Option<String>,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Zero disables client-side throttling.
	#[serde(default)]
	pub requests_per_minute: u32,
}

/// Paper-search backend (Semantic Scholar graph API shape).
#[derive(Debug, Clone, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// Optional. The public endpoint works without a key at a lower rate limit.
	pub api_key: Option<String>,
	pub api_key_env: Option<String>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub requests_per_minute: u32,
	#[serde(default = "default_search_fields")]
	pub fields: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
	/// Total attempts per backend call, including the first one.
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub jitter: bool,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000, jitter: true }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Rephrase {
	/// Additional phrasings requested on top of the original query.
	pub count: u32,
}
impl Default for Rephrase {
	fn default() -> Self {
		Self { count: 3 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub limit_per_mode: u32,
	pub concurrency: u32,
	pub semantic_weight: f32,
	pub keyword_weight: f32,
	pub snippet_chars: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			limit_per_mode: 10,
			concurrency: 4,
			semantic_weight: 0.5,
			keyword_weight: 0.5,
			snippet_chars: 300,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Aggregation {
	/// Token-set similarity at or above which a snippet is dropped as a near duplicate.
	pub near_duplicate_threshold: f32,
}
impl Default for Aggregation {
	fn default() -> Self {
		Self { near_duplicate_threshold: 0.9 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Judge {
	pub concurrency: u32,
	/// Relevance assigned to papers whose judgement failed or was cut off by the deadline.
	pub fallback_score: f32,
	/// Maximum of the backend's native score scale; scores are divided by it.
	pub score_scale: f32,
	pub max_snippets: u32,
	pub max_snippet_chars: u32,
}
impl Default for Judge {
	fn default() -> Self {
		Self {
			concurrency: 8,
			fallback_score: 0.0,
			score_scale: 1.0,
			max_snippets: 3,
			max_snippet_chars: 500,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub relevance_weight: f32,
	pub citation_weight: f32,
	pub recency_weight: f32,
	pub citation_norm: f32,
	pub recency_half_life_years: f32,
	pub unknown_year_recency: f32,
	/// When set, the recency term stays at `unknown_year_recency` unless the query asked for
	/// recent work.
	pub recency_on_request: bool,
	pub max_results: u32,
	pub labels: RankingLabels,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			relevance_weight: 0.6,
			citation_weight: 0.25,
			recency_weight: 0.15,
			citation_norm: 10_000.0,
			recency_half_life_years: 5.0,
			unknown_year_recency: 0.5,
			recency_on_request: false,
			max_results: 20,
			labels: RankingLabels::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingLabels {
	pub highly_relevant: f32,
	pub relevant: f32,
	pub somewhat_relevant: f32,
}
impl Default for RankingLabels {
	fn default() -> Self {
		Self { highly_relevant: 0.8, relevant: 0.6, somewhat_relevant: 0.3 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	/// Overall deadline for one search, measured from the start of analysis.
	pub deadline_ms: u64,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self { deadline_ms: 120_000 }
	}
}

fn default_search_fields() -> String {
	"paperId,title,abstract,year,citationCount,authors,url".to_string()
}
