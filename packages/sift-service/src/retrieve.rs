//! Hybrid retrieval fan-out: one task per phrasing, each issuing a semantic and a keyword
//! search and fusing the two hit lists locally.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{Arc, Mutex},
};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
	Candidate, Diagnostics, Error, FailureKind, PaperMetadata, PaperQuery, PaperSearch,
	RephrasedQuerySet, Result, RetrievalMethod, SearchContext, Snippet, Stage, aggregate, text,
};
use sift_providers::{SearchFilters, SearchHit, SearchMode};

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
	/// Candidates from settled phrasings, grouped by canonical id.
	pub groups: BTreeMap<String, Vec<Candidate>>,
	pub snippets: usize,
	pub failed_phrasings: usize,
	pub deadline_hit: bool,
}

/// Candidates inserted by retrieval tasks as they finish, grouped by canonical id.
///
/// Each candidate carries its phrasing index, so only phrasings the caller settled are handed
/// on; a task that finished after its phrasing was declared timed out leaves nothing behind.
#[derive(Debug, Default)]
pub struct SnippetPool {
	groups: Mutex<BTreeMap<String, Vec<Candidate>>>,
}
impl SnippetPool {
	pub fn insert_all(&self, candidates: Vec<Candidate>) {
		let mut groups = match self.groups.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};

		for candidate in candidates {
			groups.entry(aggregate::candidate_id(&candidate)).or_default().push(candidate);
		}
	}

	/// Keeps candidates whose phrasing is in `settled`, dropping groups left empty.
	pub fn into_groups(self, settled: &BTreeSet<usize>) -> BTreeMap<String, Vec<Candidate>> {
		let groups = match self.groups.into_inner() {
			Ok(groups) => groups,
			Err(poisoned) => poisoned.into_inner(),
		};

		groups
			.into_iter()
			.filter_map(|(canonical_id, mut group)| {
				group.retain(|candidate| settled.contains(&candidate.snippet.query_index));

				(!group.is_empty()).then_some((canonical_id, group))
			})
			.collect()
	}
}

#[derive(Debug, Clone)]
struct PhrasingJob {
	query_index: usize,
	text: String,
	limit: u32,
	filters: SearchFilters,
	semantic_weight: f32,
	keyword_weight: f32,
	snippet_chars: usize,
}

enum PhrasingResult {
	Complete { produced: usize },
	Partial { produced: usize, failed: SearchMode, error: sift_providers::Error },
	Failed { semantic: sift_providers::Error, keyword: sift_providers::Error },
	Cancelled,
}

/// Runs every phrasing under the retrieval concurrency cap until all finish or the deadline
/// passes. Fails only when no phrasing produced a snippet.
///
/// Results are settled in phrasing order once the fan-out ends, so diagnostics and the failure
/// classification do not depend on which task finished first.
pub async fn retrieve(
	ctx: &SearchContext,
	queries: &RephrasedQuerySet,
	filters: &SearchFilters,
	search: Arc<dyn PaperSearch>,
	diagnostics: &mut Diagnostics,
) -> Result<RetrievalOutcome> {
	let semaphore = Arc::new(Semaphore::new(ctx.retrieval.concurrency.max(1) as usize));
	let pool = Arc::new(SnippetPool::default());
	let mut tasks = JoinSet::new();

	for (query_index, phrasing) in queries.as_slice().iter().enumerate() {
		let job = PhrasingJob {
			query_index,
			text: phrasing.clone(),
			limit: ctx.retrieval.limit_per_mode,
			filters: filters.clone(),
			semantic_weight: ctx.retrieval.semantic_weight,
			keyword_weight: ctx.retrieval.keyword_weight,
			snippet_chars: ctx.retrieval.snippet_chars as usize,
		};
		let semaphore = semaphore.clone();
		let search = search.clone();
		let pool = pool.clone();

		tasks.spawn(async move {
			let Ok(_permit) = semaphore.acquire_owned().await else {
				return (query_index, PhrasingResult::Cancelled);
			};

			(query_index, retrieve_phrasing(search.as_ref(), &job, &pool).await)
		});
	}

	let mut results: BTreeMap<usize, PhrasingResult> = BTreeMap::new();
	let mut deadline_hit = false;

	loop {
		let joined = tokio::select! {
			biased;
			joined = tasks.join_next() => joined,
			_ = tokio::time::sleep_until(ctx.deadline) => {
				deadline_hit = true;

				break;
			},
		};
		let Some(joined) = joined else {
			break;
		};

		if let Ok((query_index, result)) = joined {
			results.insert(query_index, result);
		}
	}

	if deadline_hit {
		// Tasks that already finished still count; everything else is cut off here.
		while let Some(joined) = tasks.try_join_next() {
			if let Ok((query_index, result)) = joined {
				results.insert(query_index, result);
			}
		}

		tasks.abort_all();
	}

	while tasks.join_next().await.is_some() {}

	let mut outcome = RetrievalOutcome { deadline_hit, ..RetrievalOutcome::default() };
	let mut settled = BTreeSet::new();
	let mut unavailable_failures = 0;

	for (query_index, phrasing) in queries.as_slice().iter().enumerate() {
		let entity = Some(phrasing.clone());

		match results.remove(&query_index) {
			Some(PhrasingResult::Complete { produced }) => {
				settled.insert(query_index);

				tracing::debug!(query_index, snippets = produced, "Phrasing retrieved.");
			},
			Some(PhrasingResult::Partial { produced, failed, error }) => {
				settled.insert(query_index);

				diagnostics.push(
					Stage::Retrieve,
					FailureKind::from_provider(&error),
					entity,
					format!("{failed} search failed; kept {produced} hits from the other mode: {error}"),
				);
			},
			Some(PhrasingResult::Failed { semantic, keyword }) => {
				outcome.failed_phrasings += 1;

				if semantic.is_unavailable() && keyword.is_unavailable() {
					unavailable_failures += 1;
				}

				diagnostics.push(
					Stage::Retrieve,
					FailureKind::from_provider(&semantic),
					entity,
					format!("semantic: {semantic}; keyword: {keyword}"),
				);
			},
			Some(PhrasingResult::Cancelled) => {
				outcome.failed_phrasings += 1;

				diagnostics.push(
					Stage::Retrieve,
					FailureKind::Cancelled,
					entity,
					"Phrasing was cancelled before it ran.",
				);
			},
			None => {
				let (kind, message) = if deadline_hit {
					(FailureKind::Timeout, "Search deadline passed before the phrasing finished.")
				} else {
					(FailureKind::Panicked, "Retrieval task ended without a result.")
				};

				outcome.failed_phrasings += 1;

				diagnostics.push(Stage::Retrieve, kind, entity, message);
			},
		}
	}

	let pool = match Arc::try_unwrap(pool) {
		Ok(pool) => pool,
		Err(_) => {
			return Err(Error::Retrieval {
				message: "Retrieval tasks still hold the snippet pool.".to_string(),
				unavailable: false,
			});
		},
	};

	outcome.groups = pool.into_groups(&settled);
	outcome.snippets = outcome.groups.values().map(Vec::len).sum();

	tracing::info!(
		phrasings = queries.len(),
		failed = outcome.failed_phrasings,
		snippets = outcome.snippets,
		papers = outcome.groups.len(),
		deadline_hit,
		"Retrieval finished."
	);

	if outcome.snippets == 0 {
		if deadline_hit {
			return Err(Error::Timeout { stage: Stage::Retrieve });
		}

		return Err(Error::Retrieval {
			message: format!(
				"No snippets were retrieved across {} phrasing(s); {} failed.",
				queries.len(),
				outcome.failed_phrasings
			),
			unavailable: outcome.failed_phrasings == queries.len()
				&& unavailable_failures == outcome.failed_phrasings,
		});
	}

	Ok(outcome)
}

async fn retrieve_phrasing(
	search: &dyn PaperSearch,
	job: &PhrasingJob,
	pool: &SnippetPool,
) -> PhrasingResult {
	let semantic = PaperQuery {
		text: job.text.clone(),
		mode: SearchMode::Semantic,
		limit: job.limit,
		filters: job.filters.clone(),
	};
	let keyword = PaperQuery { mode: SearchMode::Keyword, ..semantic.clone() };
	let (semantic_hits, keyword_hits) =
		tokio::join!(search.search(&semantic), search.search(&keyword));

	let (candidates, partial) = match (semantic_hits, keyword_hits) {
		(Ok(semantic_hits), Ok(keyword_hits)) => (fuse_hits(job, semantic_hits, keyword_hits), None),
		(Ok(semantic_hits), Err(error)) =>
			(fuse_hits(job, semantic_hits, Vec::new()), Some((SearchMode::Keyword, error))),
		(Err(error), Ok(keyword_hits)) =>
			(fuse_hits(job, Vec::new(), keyword_hits), Some((SearchMode::Semantic, error))),
		(Err(semantic), Err(keyword)) => return PhrasingResult::Failed { semantic, keyword },
	};
	let produced = candidates.len();

	pool.insert_all(candidates);

	match partial {
		None => PhrasingResult::Complete { produced },
		Some((failed, error)) => PhrasingResult::Partial { produced, failed, error },
	}
}

#[derive(Debug, Default)]
struct FusedHit {
	semantic: Option<(f32, SearchHit)>,
	keyword: Option<(f32, SearchHit)>,
}

/// One candidate per paper: the best hit of each mode, combined by the configured weights.
fn fuse_hits(
	job: &PhrasingJob,
	semantic_hits: Vec<SearchHit>,
	keyword_hits: Vec<SearchHit>,
) -> Vec<Candidate> {
	let mut fused: BTreeMap<String, FusedHit> = BTreeMap::new();

	for (mode, hits) in [(SearchMode::Semantic, semantic_hits), (SearchMode::Keyword, keyword_hits)] {
		for hit in hits {
			let score = if hit.score.is_finite() { hit.score.clamp(0.0, 1.0) } else { 0.0 };
			let id = aggregate::canonical_id(hit.paper_ref.as_deref(), &hit.title, hit.year);
			let entry = fused.entry(id).or_default();
			let slot = match mode {
				SearchMode::Semantic => &mut entry.semantic,
				SearchMode::Keyword => &mut entry.keyword,
			};

			if slot.as_ref().is_none_or(|(best, _)| score > *best) {
				*slot = Some((score, hit));
			}
		}
	}

	fused
		.into_values()
		.filter_map(|fused| {
			let semantic_score = fused.semantic.as_ref().map(|(score, _)| *score);
			let keyword_score = fused.keyword.as_ref().map(|(score, _)| *score);
			let method = match (semantic_score, keyword_score) {
				(Some(_), Some(_)) => RetrievalMethod::Hybrid,
				(Some(_), None) => RetrievalMethod::Semantic,
				(None, Some(_)) => RetrievalMethod::Keyword,
				(None, None) => return None,
			};
			let retrieval_score = job.semantic_weight * semantic_score.unwrap_or(0.0)
				+ job.keyword_weight * keyword_score.unwrap_or(0.0);
			let (_, hit) = fused.semantic.or(fused.keyword)?;

			Some(Candidate {
				snippet: Snippet {
					source_query: job.text.clone(),
					query_index: job.query_index,
					paper_ref: hit.paper_ref,
					text: text::truncate_graphemes(&hit.snippet_text, job.snippet_chars),
					retrieval_score,
					retrieval_method: method,
				},
				metadata: PaperMetadata {
					title: hit.title,
					authors: hit.authors,
					year: hit.year,
					citation_count: hit.citation_count,
					abstract_text: hit.abstract_text,
					url: hit.url,
				},
			})
		})
		.collect()
}
