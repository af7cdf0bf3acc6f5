//! Cross-phrasing deduplication.
//!
//! The result depends only on the set of candidates: every group is ordered by a total order
//! before anything order-sensitive (near-duplicate filtering, first-wins metadata) runs, and
//! papers come out sorted by canonical id.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet},
};

use crate::{Candidate, Paper, text};
use sift_providers::YearRange;

#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
	pub papers: Vec<Paper>,
	pub near_duplicates_dropped: usize,
	pub outside_year_range: usize,
}

/// Backend id when present, otherwise a hash of the normalized title and year.
pub fn canonical_id(paper_ref: Option<&str>, title: &str, year: Option<i32>) -> String {
	if let Some(id) = paper_ref.map(str::trim).filter(|id| !id.is_empty()) {
		return id.to_string();
	}

	let year = year.map(|year| year.to_string()).unwrap_or_default();
	let key = format!("{}|{year}", text::normalize_title(title));

	format!("title:{}", blake3::hash(key.as_bytes()).to_hex())
}

pub fn candidate_id(candidate: &Candidate) -> String {
	canonical_id(
		candidate.snippet.paper_ref.as_deref(),
		&candidate.metadata.title,
		candidate.metadata.year,
	)
}

pub fn group_candidates(
	candidates: impl IntoIterator<Item = Candidate>,
) -> BTreeMap<String, Vec<Candidate>> {
	let mut groups: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

	for candidate in candidates {
		groups.entry(candidate_id(&candidate)).or_default().push(candidate);
	}

	groups
}

/// Merges each canonical-id group into one paper. Group order inside the map is irrelevant.
pub fn aggregate(
	groups: BTreeMap<String, Vec<Candidate>>,
	near_duplicate_threshold: f32,
	year_range: Option<&YearRange>,
) -> AggregationOutcome {
	let mut outcome = AggregationOutcome::default();

	for (canonical_id, mut group) in groups {
		group.sort_by(cmp_candidates);

		let (paper, dropped) = merge_group(canonical_id, &group, near_duplicate_threshold);

		outcome.near_duplicates_dropped += dropped;

		if let (Some(range), Some(year)) = (year_range, paper.year)
			&& !range.contains(year)
		{
			outcome.outside_year_range += 1;

			continue;
		}

		outcome.papers.push(paper);
	}

	tracing::info!(
		papers = outcome.papers.len(),
		near_duplicates = outcome.near_duplicates_dropped,
		outside_year_range = outcome.outside_year_range,
		"Candidates aggregated."
	);

	outcome
}

/// Total order on candidates: score desc, phrasing index asc, method, text, then the rest.
pub fn cmp_candidates(a: &Candidate, b: &Candidate) -> Ordering {
	b.snippet
		.retrieval_score
		.total_cmp(&a.snippet.retrieval_score)
		.then_with(|| a.snippet.query_index.cmp(&b.snippet.query_index))
		.then_with(|| a.snippet.retrieval_method.cmp(&b.snippet.retrieval_method))
		.then_with(|| a.snippet.text.cmp(&b.snippet.text))
		.then_with(|| a.snippet.source_query.cmp(&b.snippet.source_query))
		.then_with(|| a.snippet.paper_ref.cmp(&b.snippet.paper_ref))
		.then_with(|| a.metadata.title.cmp(&b.metadata.title))
		.then_with(|| a.metadata.year.cmp(&b.metadata.year))
		.then_with(|| a.metadata.citation_count.cmp(&b.metadata.citation_count))
		.then_with(|| a.metadata.authors.cmp(&b.metadata.authors))
		.then_with(|| a.metadata.abstract_text.cmp(&b.metadata.abstract_text))
		.then_with(|| a.metadata.url.cmp(&b.metadata.url))
}

fn merge_group(canonical_id: String, ordered: &[Candidate], threshold: f32) -> (Paper, usize) {
	let mut kept_tokens: Vec<BTreeSet<String>> = Vec::new();
	let mut snippets = Vec::new();
	let mut dropped = 0;
	let mut title = String::new();
	let mut authors = Vec::new();
	let mut year = None;
	let mut citation_count = None;
	let mut abstract_text = None;
	let mut url = None;
	let mut best_retrieval_score = f32::MIN;
	let mut queries: BTreeMap<usize, String> = BTreeMap::new();
	let mut methods = BTreeSet::new();

	for candidate in ordered {
		let snippet = &candidate.snippet;
		let metadata = &candidate.metadata;

		best_retrieval_score = best_retrieval_score.max(snippet.retrieval_score);

		queries.entry(snippet.query_index).or_insert_with(|| snippet.source_query.clone());
		methods.insert(snippet.retrieval_method);

		if title.is_empty() && !metadata.title.trim().is_empty() {
			title = metadata.title.trim().to_string();
		}
		if authors.is_empty() && !metadata.authors.is_empty() {
			authors = metadata.authors.clone();
		}
		if year.is_none() {
			year = metadata.year;
		}
		if citation_count.is_none() {
			citation_count = metadata.citation_count;
		}
		if abstract_text.is_none() {
			abstract_text = metadata.abstract_text.clone();
		}
		if url.is_none() {
			url = metadata.url.clone();
		}

		let tokens = text::token_set(&snippet.text);

		if kept_tokens.iter().any(|kept| text::jaccard(kept, &tokens) >= threshold) {
			dropped += 1;

			continue;
		}

		kept_tokens.push(tokens);
		snippets.push(snippet.clone());
	}

	let paper = Paper {
		canonical_id,
		title,
		authors,
		year,
		citation_count,
		abstract_text,
		url,
		snippets,
		best_retrieval_score,
		queries: queries.into_values().collect(),
		retrieval_methods: methods.into_iter().collect(),
	};

	(paper, dropped)
}
