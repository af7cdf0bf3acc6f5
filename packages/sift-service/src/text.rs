use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Case-folded, whitespace-collapsed form used to compare phrasings.
pub fn normalize_query_key(text: &str) -> String {
	let folded: String = text.nfkc().collect::<String>().to_lowercase();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title key for papers without a backend id: punctuation dropped, words joined by one space.
pub fn normalize_title(title: &str) -> String {
	let folded: String = title.nfkc().collect::<String>().to_lowercase();
	let mut normalized = String::with_capacity(folded.len());

	for ch in folded.chars() {
		if ch.is_alphanumeric() {
			normalized.push(ch);
		} else {
			normalized.push(' ');
		}
	}

	normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn token_set(text: &str) -> BTreeSet<String> {
	text.nfkc().collect::<String>().unicode_words().map(str::to_lowercase).collect()
}

/// Jaccard similarity of two token sets. Two empty sets are identical.
pub fn jaccard(lhs: &BTreeSet<String>, rhs: &BTreeSet<String>) -> f32 {
	if lhs.is_empty() && rhs.is_empty() {
		return 1.0;
	}

	let shared = lhs.intersection(rhs).count();
	let union = lhs.len() + rhs.len() - shared;

	shared as f32 / union as f32
}

/// Cuts `text` to at most `max_chars` grapheme clusters.
pub fn truncate_graphemes(text: &str, max_chars: usize) -> String {
	let trimmed = text.trim();

	match trimmed.grapheme_indices(true).nth(max_chars) {
		Some((idx, _)) => trimmed[..idx].trim_end().to_string(),
		None => trimmed.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn query_key_folds_case_and_whitespace() {
		assert_eq!(normalize_query_key("  Graph   Neural\tNetworks "), "graph neural networks");
		assert_eq!(normalize_query_key("GNNs"), normalize_query_key("gnns"));
	}

	#[test]
	fn title_normalization_drops_punctuation() {
		assert_eq!(
			normalize_title("Graph Neural Networks: A Review!"),
			normalize_title("graph neural networks a review")
		);
	}

	#[test]
	fn jaccard_bounds() {
		let a = token_set("graph neural networks for molecules");
		let b = token_set("Graph neural networks for molecules.");
		let c = token_set("protein folding with transformers");

		assert_eq!(jaccard(&a, &b), 1.0);
		assert_eq!(jaccard(&a, &c), 0.0);
		assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 1.0);
	}

	#[test]
	fn truncation_respects_grapheme_boundaries() {
		assert_eq!(truncate_graphemes("héllo wörld", 5), "héllo");
		assert_eq!(truncate_graphemes("short", 50), "short");
	}
}
