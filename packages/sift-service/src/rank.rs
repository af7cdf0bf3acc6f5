use std::cmp::Ordering;

use crate::{JudgedPaper, RankedResult, RelevanceLabel};
use sift_config::{Ranking, RankingLabels};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
	pub final_score: f32,
	pub citation_term: f32,
	pub recency_term: f32,
}

/// Log-scaled citation term in [0, 1]; `norm` citations or more saturate at 1.
pub fn citation_term(citation_count: Option<u64>, norm: f32) -> f32 {
	let count = citation_count.unwrap_or(0) as f64;
	let norm = norm.max(1.0) as f64;

	((count + 1.0).ln() / (norm + 1.0).ln()).clamp(0.0, 1.0) as f32
}

/// Halves every `half_life_years`; papers from this year or the future score 1.
pub fn recency_term(year: Option<i32>, current_year: i32, ranking: &Ranking) -> f32 {
	let Some(year) = year else {
		return ranking.unknown_year_recency;
	};

	if ranking.recency_half_life_years <= 0.0 {
		return 1.0;
	}

	let age = (current_year - year).max(0) as f32;

	0.5_f32.powf(age / ranking.recency_half_life_years)
}

/// `recent_first` only matters when `ranking.recency_on_request` is set; without the preference
/// every paper then gets the neutral recency term.
pub fn score(
	judged: &JudgedPaper,
	ranking: &Ranking,
	current_year: i32,
	recent_first: bool,
) -> ScoreBreakdown {
	let citation_term = citation_term(judged.paper.citation_count, ranking.citation_norm);
	let recency_term = if ranking.recency_on_request && !recent_first {
		ranking.unknown_year_recency
	} else {
		recency_term(judged.paper.year, current_year, ranking)
	};
	let final_score = ranking.relevance_weight * judged.relevance_score
		+ ranking.citation_weight * citation_term
		+ ranking.recency_weight * recency_term;

	ScoreBreakdown { final_score, citation_term, recency_term }
}

pub fn label_for(final_score: f32, labels: &RankingLabels) -> RelevanceLabel {
	if final_score >= labels.highly_relevant {
		RelevanceLabel::HighlyRelevant
	} else if final_score >= labels.relevant {
		RelevanceLabel::Relevant
	} else if final_score >= labels.somewhat_relevant {
		RelevanceLabel::SomewhatRelevant
	} else {
		RelevanceLabel::NotRelevant
	}
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Sorts by final score, ties broken by canonical id, then keeps the top `max_results`.
pub fn rank(
	papers: Vec<JudgedPaper>,
	ranking: &Ranking,
	current_year: i32,
	recent_first: bool,
	max_results: usize,
) -> Vec<RankedResult> {
	let mut scored: Vec<(ScoreBreakdown, JudgedPaper)> = papers
		.into_iter()
		.map(|judged| (score(&judged, ranking, current_year, recent_first), judged))
		.collect();

	scored.sort_by(|(a_score, a), (b_score, b)| {
		cmp_f32_desc(a_score.final_score, b_score.final_score)
			.then_with(|| a.paper.canonical_id.cmp(&b.paper.canonical_id))
	});
	scored.truncate(max_results);

	scored
		.into_iter()
		.enumerate()
		.map(|(idx, (breakdown, judged))| RankedResult {
			rank: idx as u32 + 1,
			final_score: breakdown.final_score,
			citation_term: breakdown.citation_term,
			recency_term: breakdown.recency_term,
			label: label_for(breakdown.final_score, &ranking.labels),
			judged,
		})
		.collect()
}
