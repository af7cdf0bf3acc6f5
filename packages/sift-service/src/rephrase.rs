use serde::Deserialize;
use serde_json::Value;

use crate::{
	AnalysisResult, CompletionRequest, Diagnostics, FailureKind, LanguageModel, LlmTask,
	RephrasedQuerySet, SearchContext, Stage,
};

#[derive(Debug, Deserialize)]
struct RephraserOutput {
	#[serde(alias = "reformulations")]
	queries: Vec<Value>,
}

/// Builds the phrasing set: the caller's query, the analyzed topic when it differs, then up to
/// `rephrase_count` rephrasings of the topic. Never fails; a backend problem only skips the
/// rephrasings.
pub async fn rephrase(
	ctx: &SearchContext,
	analysis: &AnalysisResult,
	llm: &dyn LanguageModel,
	diagnostics: &mut Diagnostics,
) -> RephrasedQuerySet {
	let mut set = RephrasedQuerySet::new(&ctx.query);

	set.push(&analysis.content_query);

	if ctx.rephrase_count == 0 {
		return set;
	}

	let request = CompletionRequest {
		task: LlmTask::Rephrase,
		messages: build_rephrase_messages(&analysis.content_query, analysis, ctx.rephrase_count),
	};

	match llm.complete(&request).await {
		Ok(raw) =>
			if let Err(reason) = extend_from_output(&mut set, raw, ctx.rephrase_count) {
				diagnostics.push(Stage::Rephrase, FailureKind::InvalidResponse, None, reason);
			},
		Err(err) => {
			diagnostics.push(
				Stage::Rephrase,
				FailureKind::from_provider(&err),
				None,
				err.to_string(),
			);
		},
	}

	tracing::info!(phrasings = set.len(), requested = ctx.rephrase_count, "Query rephrased.");

	set
}

/// Appends at most `limit` new phrasings; duplicates are skipped without using up the limit.
///
/// The set is left untouched when the output does not match the schema.
pub fn extend_from_output(
	set: &mut RephrasedQuerySet,
	raw: Value,
	limit: usize,
) -> Result<usize, String> {
	let output: RephraserOutput = serde_json::from_value(raw)
		.map_err(|err| format!("Rephraser output does not match the schema: {err}"))?;
	let mut added = 0;

	for candidate in output.queries.iter().filter_map(Value::as_str) {
		if added >= limit {
			break;
		}
		if set.push(candidate) {
			added += 1;
		}
	}

	Ok(added)
}

fn build_rephrase_messages(query: &str, analysis: &AnalysisResult, count: usize) -> Vec<Value> {
	let schema = serde_json::json!({ "queries": ["string"] });
	let system_prompt = "You rewrite literature search queries. \
Output must be valid JSON only and must match the provided schema exactly. \
Each rewrite keeps the meaning of the query and changes the wording: synonyms, related terminology, or a different framing. \
Each rewrite must stand alone as a search query. Do not add explanations.";
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema}\nConstraints:\n- COUNT = {count}\n- QUERY_TYPE = {}\nQuery:\n{}",
		analysis.intent.as_str(),
		Value::String(query.to_string())
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn duplicates_do_not_count_toward_limit() {
		let mut set = RephrasedQuerySet::new("graph neural networks");
		let raw = serde_json::json!({
			"queries": ["Graph  Neural Networks", "GNN architectures", "message passing networks", "graph representation learning"]
		});
		let added = extend_from_output(&mut set, raw, 2).expect("Expected valid rephrase output.");

		assert_eq!(added, 2);
		assert_eq!(
			set.as_slice(),
			&[
				"graph neural networks".to_string(),
				"GNN architectures".to_string(),
				"message passing networks".to_string()
			]
		);
	}

	#[test]
	fn accepts_reformulations_key() {
		let mut set = RephrasedQuerySet::new("q");
		let raw = serde_json::json!({ "reformulations": ["r1", 7, "r2"] });

		assert_eq!(extend_from_output(&mut set, raw, 3), Ok(2));
	}

	#[test]
	fn schema_violation_leaves_singleton() {
		let mut set = RephrasedQuerySet::new("q");

		assert!(extend_from_output(&mut set, serde_json::json!({ "text": "r1" }), 3).is_err());
		assert_eq!(set.len(), 1);
	}
}
