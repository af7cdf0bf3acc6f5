use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	AnalysisResult, Diagnostics, Error, RankedResult, RelevanceLabel, RephrasedQuerySet, Result,
	SearchContext, SearchRequest, SiftService, Stage, aggregate, analyze, judge, rank, rephrase,
	retrieve,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
	Analyzing,
	Rephrasing,
	Retrieving,
	Aggregating,
	Judging,
	Ranking,
	Done,
	Failed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
	pub phrasings: usize,
	pub failed_phrasings: usize,
	pub snippets: usize,
	pub unique_papers: usize,
	pub near_duplicates_dropped: usize,
	pub outside_year_range: usize,
	pub judged: usize,
	pub fallback_judgements: usize,
	pub results: usize,
	pub labels: BTreeMap<RelevanceLabel, usize>,
	pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub run_id: Uuid,
	pub query: String,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	pub analysis: AnalysisResult,
	pub queries: RephrasedQuerySet,
	pub results: Vec<RankedResult>,
	pub diagnostics: Diagnostics,
	pub stats: SearchStats,
	pub states: Vec<PipelineState>,
}
impl SearchResponse {
	/// True when at least one failure was absorbed on the way to the results.
	pub fn is_degraded(&self) -> bool {
		!self.diagnostics.is_empty()
	}
}

struct StateTrail {
	run_id: Uuid,
	states: Vec<PipelineState>,
}
impl StateTrail {
	fn enter(&mut self, state: PipelineState) {
		tracing::debug!(run_id = %self.run_id, state = ?state, "Search state changed.");

		self.states.push(state);
	}

	fn fail(&mut self, err: Error) -> Error {
		self.enter(PipelineState::Failed);

		tracing::error!(
			run_id = %self.run_id,
			stage = err.stage().map(Stage::as_str).unwrap_or("request"),
			error = %err,
			"Search failed."
		);

		err
	}
}

impl SiftService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		self.search_at(req, OffsetDateTime::now_utc()).await
	}

	/// Runs one search with `now` as the clock for recency scoring and the response timestamp.
	pub async fn search_at(&self, req: SearchRequest, now: OffsetDateTime) -> Result<SearchResponse> {
		validate_request(&req)?;

		let ctx = SearchContext::new(&self.cfg, &req, now.year());
		let mut trail = StateTrail { run_id: Uuid::new_v4(), states: Vec::new() };
		let mut diagnostics = Diagnostics::default();
		let mut stats = SearchStats::default();

		tracing::info!(run_id = %trail.run_id, query = %ctx.query, "Search started.");

		trail.enter(PipelineState::Analyzing);

		let analysis = match tokio::time::timeout_at(
			ctx.deadline,
			analyze::analyze(&ctx, self.providers.llm.as_ref(), &mut diagnostics),
		)
		.await
		{
			Ok(Ok(analysis)) => analysis,
			Ok(Err(err)) => return Err(trail.fail(err)),
			Err(_) => return Err(trail.fail(Error::Timeout { stage: Stage::Analyze })),
		};

		trail.enter(PipelineState::Rephrasing);

		let queries = match tokio::time::timeout_at(
			ctx.deadline,
			rephrase::rephrase(&ctx, &analysis, self.providers.llm.as_ref(), &mut diagnostics),
		)
		.await
		{
			Ok(queries) => queries,
			Err(_) => return Err(trail.fail(Error::Timeout { stage: Stage::Rephrase })),
		};

		stats.phrasings = queries.len();

		trail.enter(PipelineState::Retrieving);

		let retrieval = match retrieve::retrieve(
			&ctx,
			&queries,
			&analysis.filters,
			self.providers.search.clone(),
			&mut diagnostics,
		)
		.await
		{
			Ok(retrieval) => retrieval,
			Err(err) => return Err(trail.fail(err)),
		};

		stats.failed_phrasings = retrieval.failed_phrasings;
		stats.snippets = retrieval.snippets;

		trail.enter(PipelineState::Aggregating);

		let aggregation = aggregate::aggregate(
			retrieval.groups,
			ctx.aggregation.near_duplicate_threshold,
			analysis.filters.year_range.as_ref(),
		);

		stats.unique_papers = aggregation.papers.len();
		stats.near_duplicates_dropped = aggregation.near_duplicates_dropped;
		stats.outside_year_range = aggregation.outside_year_range;

		trail.enter(PipelineState::Judging);

		let judged = judge::judge(
			&ctx,
			&analysis,
			aggregation.papers,
			self.providers.llm.clone(),
			&mut diagnostics,
		)
		.await;

		stats.judged = judged.papers.len() - judged.fallbacks;
		stats.fallback_judgements = judged.fallbacks;

		trail.enter(PipelineState::Ranking);

		let results = rank::rank(
			judged.papers,
			&ctx.ranking,
			ctx.current_year,
			analysis.recent_first,
			ctx.max_results,
		);

		stats.results = results.len();

		for result in &results {
			*stats.labels.entry(result.label).or_default() += 1;
		}

		stats.elapsed_ms = ctx.elapsed().as_millis() as u64;

		trail.enter(PipelineState::Done);

		tracing::info!(
			run_id = %trail.run_id,
			results = stats.results,
			diagnostics = diagnostics.len(),
			elapsed_ms = stats.elapsed_ms,
			"Search finished."
		);

		Ok(SearchResponse {
			run_id: trail.run_id,
			query: ctx.query,
			started_at: now,
			analysis,
			queries,
			results,
			diagnostics,
			stats,
			states: trail.states,
		})
	}
}

fn validate_request(req: &SearchRequest) -> Result<()> {
	if req.query.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
	}
	if req.max_results == Some(0) {
		return Err(Error::InvalidRequest {
			message: "max_results must be greater than zero.".to_string(),
		});
	}

	Ok(())
}
