use std::time::Duration;

use tokio::time::Instant;

use crate::model::SearchRequest;
use sift_config::{Aggregation, Config, Judge, Ranking, Retrieval};
use sift_providers::SearchFilters;

/// Read-only view of everything one search needs, shared by every stage.
#[derive(Debug, Clone)]
pub struct SearchContext {
	pub query: String,
	pub requested_filters: Option<SearchFilters>,
	pub rephrase_count: usize,
	pub retrieval: Retrieval,
	pub aggregation: Aggregation,
	pub judge: Judge,
	pub ranking: Ranking,
	pub max_results: usize,
	pub current_year: i32,
	pub started_at: Instant,
	pub deadline: Instant,
}
impl SearchContext {
	pub fn new(cfg: &Config, request: &SearchRequest, current_year: i32) -> Self {
		let started_at = Instant::now();
		let max_results = request.max_results.unwrap_or(cfg.ranking.max_results) as usize;

		Self {
			query: request.query.trim().to_string(),
			requested_filters: request.filters.clone(),
			rephrase_count: cfg.rephrase.count as usize,
			retrieval: cfg.retrieval.clone(),
			aggregation: cfg.aggregation.clone(),
			judge: cfg.judge.clone(),
			ranking: cfg.ranking.clone(),
			max_results,
			current_year,
			started_at,
			deadline: started_at + Duration::from_millis(cfg.pipeline.deadline_ms),
		}
	}

	pub fn deadline_passed(&self) -> bool {
		Instant::now() >= self.deadline
	}

	pub fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}
}
