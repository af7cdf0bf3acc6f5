use std::{fmt, time::Duration};

use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, RateLimiter, Result, RetryPolicy};

const API_KEY_HEADER: &str = "x-api-key";
const RELEVANCE_SEARCH_PATH: &str = "/paper/search";
const BULK_SEARCH_PATH: &str = "/paper/search/bulk";
const MAX_RELEVANCE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Semantic,
	Keyword,
}
impl SearchMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Semantic => "semantic",
			Self::Keyword => "keyword",
		}
	}
}
impl fmt::Display for SearchMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
	pub start: Option<i32>,
	pub end: Option<i32>,
}
impl YearRange {
	pub fn contains(&self, year: i32) -> bool {
		self.start.is_none_or(|start| year >= start) && self.end.is_none_or(|end| year <= end)
	}

	pub fn is_open(&self) -> bool {
		self.start.is_none() && self.end.is_none()
	}

	/// Renders the `year` query parameter, e.g. `2019-2023`, `2019-`, or `-2023`.
	pub fn to_param(&self) -> Option<String> {
		match (self.start, self.end) {
			(None, None) => None,
			(Some(start), Some(end)) if start == end => Some(start.to_string()),
			(start, end) => Some(format!(
				"{}-{}",
				start.map(|y| y.to_string()).unwrap_or_default(),
				end.map(|y| y.to_string()).unwrap_or_default()
			)),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
	pub year_range: Option<YearRange>,
	#[serde(default)]
	pub venues: Vec<String>,
}

/// One backend hit. `score` is on the backend's own scale; this adapter derives it from rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub paper_ref: Option<String>,
	pub title: String,
	pub abstract_text: Option<String>,
	pub year: Option<i32>,
	pub citation_count: Option<u64>,
	pub authors: Vec<String>,
	pub url: Option<String>,
	pub snippet_text: String,
	pub score: f32,
}

#[derive(Debug)]
pub struct ScholarClient {
	cfg: sift_config::SearchProviderConfig,
	client: Client,
	headers: HeaderMap,
	limiter: RateLimiter,
	retry: RetryPolicy,
}
impl ScholarClient {
	pub fn new(cfg: &sift_config::SearchProviderConfig, retry: RetryPolicy) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers =
			crate::api_key_headers(API_KEY_HEADER, cfg.api_key.as_deref(), &cfg.default_headers)?;

		Ok(Self {
			cfg: cfg.clone(),
			client,
			headers,
			limiter: RateLimiter::per_minute(cfg.requests_per_minute),
			retry,
		})
	}

	pub async fn search(
		&self,
		query: &str,
		mode: SearchMode,
		limit: u32,
		filters: &SearchFilters,
	) -> Result<Vec<SearchHit>> {
		let label = format!("{}:{}", self.cfg.provider_id, mode);

		self.retry
			.run(&label, || async {
				self.limiter.acquire().await;

				self.search_once(query, mode, limit, filters).await
			})
			.await
	}

	async fn search_once(
		&self,
		query: &str,
		mode: SearchMode,
		limit: u32,
		filters: &SearchFilters,
	) -> Result<Vec<SearchHit>> {
		let (path, limit) = match mode {
			SearchMode::Semantic => (RELEVANCE_SEARCH_PATH, limit.clamp(1, MAX_RELEVANCE_LIMIT)),
			SearchMode::Keyword => (BULK_SEARCH_PATH, limit.max(1)),
		};
		let url = format!("{}{}", self.cfg.api_base, path);
		let mut params = vec![
			("query".to_string(), query.to_string()),
			("fields".to_string(), self.cfg.fields.clone()),
		];

		if mode == SearchMode::Semantic {
			params.push(("limit".to_string(), limit.to_string()));
		}
		if let Some(year) = filters.year_range.as_ref().and_then(YearRange::to_param) {
			params.push(("year".to_string(), year));
		}
		if !filters.venues.is_empty() {
			params.push(("venue".to_string(), filters.venues.join(",")));
		}

		tracing::debug!(mode = mode.as_str(), query, "Paper search request.");

		let res = self
			.client
			.get(&url)
			.headers(self.headers.clone())
			.query(&params)
			.send()
			.await
			.map_err(|err| crate::map_send_error(err, self.cfg.timeout_ms))?;
		let json = crate::read_json(res, self.cfg.timeout_ms).await?;

		parse_search_response(json, limit)
	}
}

/// Parses a graph-API search page, keeping at most `limit` hits in backend order.
pub fn parse_search_response(json: Value, limit: u32) -> Result<Vec<SearchHit>> {
	let data: &[Value] = match json.get("data") {
		Some(Value::Array(items)) => items.as_slice(),
		Some(Value::Null) | None if json.get("total").is_some() => &[],
		_ => {
			return Err(Error::InvalidResponse {
				message: "Search response is missing data array.".to_string(),
			});
		},
	};
	let kept = data.len().min(limit as usize);
	let total = limit.max(kept as u32);
	let mut out = Vec::with_capacity(kept);

	for (idx, item) in data.iter().take(kept).enumerate() {
		let Some(title) = item.get("title").and_then(Value::as_str).map(str::trim) else {
			tracing::warn!(index = idx, "Search hit missing title.");

			continue;
		};

		if title.is_empty() {
			continue;
		}

		let abstract_text = item
			.get("abstract")
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.map(str::to_string);
		let authors = item
			.get("authors")
			.and_then(Value::as_array)
			.map(|authors| {
				authors
					.iter()
					.filter_map(|author| author.get("name").and_then(Value::as_str))
					.map(str::trim)
					.filter(|name| !name.is_empty())
					.map(str::to_string)
					.collect()
			})
			.unwrap_or_default();
		let snippet_text = abstract_text.clone().unwrap_or_else(|| title.to_string());

		out.push(SearchHit {
			paper_ref: item
				.get("paperId")
				.and_then(Value::as_str)
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.map(str::to_string),
			title: title.to_string(),
			abstract_text,
			year: item.get("year").and_then(Value::as_i64).map(|year| year as i32),
			citation_count: item.get("citationCount").and_then(Value::as_u64),
			authors,
			url: item.get("url").and_then(Value::as_str).map(str::to_string),
			snippet_text,
			score: rank_score(idx as u32 + 1, total),
		});
	}

	Ok(out)
}

/// Maps a 1-based rank onto (0, 1], first hit scoring 1.0.
pub fn rank_score(rank: u32, total: u32) -> f32 {
	if total <= 1 || rank <= 1 {
		return 1.0;
	}

	let pos = (rank - 1).min(total) as f32;

	(1.0 - pos / total as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_hits_in_backend_order() {
		let json = serde_json::json!({
			"total": 3,
			"data": [
				{
					"paperId": "p1",
					"title": "Graph Networks",
					"abstract": "We study graphs.",
					"year": 2021,
					"citationCount": 40,
					"authors": [{ "name": "Ada" }, { "name": null }],
					"url": "https://example.org/p1"
				},
				{ "paperId": "p2", "title": "No Abstract", "year": null, "citationCount": null },
				{ "paperId": "p3", "title": "   " }
			]
		});
		let hits = parse_search_response(json, 10).expect("Failed to parse fixture.");

		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].paper_ref.as_deref(), Some("p1"));
		assert_eq!(hits[0].authors, vec!["Ada".to_string()]);
		assert_eq!(hits[0].snippet_text, "We study graphs.");
		assert_eq!(hits[1].snippet_text, "No Abstract");
		assert_eq!(hits[1].citation_count, None);
		assert!(hits[0].score > hits[1].score);
	}

	#[test]
	fn empty_page_is_not_an_error() {
		let json = serde_json::json!({ "total": 0 });

		assert!(parse_search_response(json, 5).expect("Failed to parse fixture.").is_empty());
	}

	#[test]
	fn truncates_to_limit() {
		let items: Vec<Value> = (0..20)
			.map(|i| serde_json::json!({ "paperId": format!("p{i}"), "title": format!("T{i}") }))
			.collect();
		let hits =
			parse_search_response(serde_json::json!({ "data": items }), 5).expect("Failed to parse fixture.");

		assert_eq!(hits.len(), 5);
	}

	#[test]
	fn year_range_renders_open_bounds() {
		assert_eq!(YearRange { start: Some(2019), end: None }.to_param().as_deref(), Some("2019-"));
		assert_eq!(YearRange { start: None, end: Some(2020) }.to_param().as_deref(), Some("-2020"));
		assert_eq!(
			YearRange { start: Some(2020), end: Some(2020) }.to_param().as_deref(),
			Some("2020")
		);
		assert!(YearRange::default().to_param().is_none());
	}

	#[test]
	fn rank_score_is_monotonic() {
		assert_eq!(rank_score(1, 10), 1.0);
		assert!(rank_score(2, 10) > rank_score(3, 10));
		assert!(rank_score(10, 10) > 0.0);
	}
}
