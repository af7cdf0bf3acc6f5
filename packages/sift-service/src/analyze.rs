//! Query understanding: intent, topic, filters, and the criteria papers are judged against.

use serde::Deserialize;
use serde_json::Value;

use crate::{
	AnalysisResult, CompletionRequest, Criterion, Diagnostics, Error, FailureKind, Intent,
	LanguageModel, LlmTask, Result, SearchContext, Stage, text,
};
use sift_providers::{SearchFilters, YearRange};

const MAX_CRITERIA: usize = 8;

#[derive(Debug, Deserialize)]
struct AnalyzerOutput {
	query_type: Option<QueryTypeField>,
	content_query: Option<String>,
	relevance_criteria: Option<CriteriaField>,
	time_range: Option<TimeRangeField>,
	venues: Option<Vec<String>>,
	authors: Option<Vec<String>>,
	domains: Option<DomainsField>,
	recent_first: Option<bool>,
	central_first: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryTypeField {
	Tagged {
		#[serde(rename = "type")]
		kind: Intent,
	},
	Bare(Intent),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CriteriaField {
	Wrapped { criteria: Vec<CriterionField> },
	Bare(Vec<CriterionField>),
}

#[derive(Debug, Deserialize)]
struct CriterionField {
	description: Option<String>,
	weight: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct TimeRangeField {
	start_year: Option<i32>,
	end_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DomainsField {
	Wrapped { domains: Vec<String> },
	Bare(Vec<String>),
}

/// Runs the analyzer call.
///
/// Only an unreachable backend is an error. Anything the backend returns that does not fit the
/// schema is recorded and replaced by the fallback analysis.
pub async fn analyze(
	ctx: &SearchContext,
	llm: &dyn LanguageModel,
	diagnostics: &mut Diagnostics,
) -> Result<AnalysisResult> {
	let request =
		CompletionRequest { task: LlmTask::Analyze, messages: build_analyzer_messages(&ctx.query) };
	let mut analysis = match llm.complete(&request).await {
		Ok(raw) => match parse_analysis(&ctx.query, raw) {
			Ok(parsed) => parsed,
			Err(reason) => {
				diagnostics.push(Stage::Analyze, FailureKind::InvalidResponse, None, reason);

				AnalysisResult::fallback(&ctx.query)
			},
		},
		Err(err) if err.is_unavailable() => {
			return Err(Error::Analysis { message: err.to_string() });
		},
		Err(err) => {
			diagnostics.push(Stage::Analyze, FailureKind::from_provider(&err), None, err.to_string());

			AnalysisResult::fallback(&ctx.query)
		},
	};

	if analysis.criteria.is_empty() {
		diagnostics.push(
			Stage::Analyze,
			FailureKind::Empty,
			None,
			"Analyzer returned no usable criteria; using the query as the only criterion.",
		);

		analysis.criteria =
			vec![Criterion { description: ctx.query.trim().to_string(), weight: 1.0 }];
	}
	if let Some(requested) = ctx.requested_filters.as_ref() {
		analysis.filters = merge_filters(requested, &analysis.filters);
	}

	tracing::info!(
		intent = analysis.intent.as_str(),
		criteria = analysis.criteria.len(),
		fallback = analysis.fallback,
		"Query analyzed."
	);

	Ok(analysis)
}

/// Validates analyzer output into an [`AnalysisResult`]. Criteria may come back empty.
pub fn parse_analysis(query: &str, raw: Value) -> std::result::Result<AnalysisResult, String> {
	let output: AnalyzerOutput = serde_json::from_value(raw)
		.map_err(|err| format!("Analyzer output does not match the schema: {err}"))?;
	let intent = match output.query_type {
		Some(QueryTypeField::Tagged { kind } | QueryTypeField::Bare(kind)) => kind,
		None => Intent::default(),
	};
	let content_query = output
		.content_query
		.map(|text| text.trim().to_string())
		.filter(|text| !text.is_empty())
		.unwrap_or_else(|| query.trim().to_string());
	let criteria = match output.relevance_criteria {
		Some(CriteriaField::Wrapped { criteria } | CriteriaField::Bare(criteria)) =>
			normalize_criteria(criteria),
		None => Vec::new(),
	};
	let year_range = output.time_range.and_then(|range| {
		let range = YearRange { start: range.start_year, end: range.end_year };

		match (range.start, range.end) {
			_ if range.is_open() => None,
			(Some(start), Some(end)) if start > end => None,
			_ => Some(range),
		}
	});
	let domains = match output.domains {
		Some(DomainsField::Wrapped { domains } | DomainsField::Bare(domains)) => domains,
		None => Vec::new(),
	};

	Ok(AnalysisResult {
		intent,
		content_query,
		filters: SearchFilters {
			year_range,
			venues: clean_list(output.venues.unwrap_or_default()),
		},
		criteria,
		authors: clean_list(output.authors.unwrap_or_default()),
		domains: clean_list(domains),
		recent_first: output.recent_first.unwrap_or(false),
		central_first: output.central_first.unwrap_or(false),
		fallback: false,
	})
}

fn normalize_criteria(raw: Vec<CriterionField>) -> Vec<Criterion> {
	let mut out: Vec<(String, Option<f32>)> = Vec::new();
	let mut seen = Vec::new();

	for field in raw {
		let Some(description) = field.description.map(|text| text.trim().to_string()) else {
			continue;
		};

		if description.is_empty() {
			continue;
		}

		let key = text::normalize_query_key(&description);

		if seen.contains(&key) {
			continue;
		}

		seen.push(key);
		out.push((description, field.weight.filter(|weight| weight.is_finite())));

		if out.len() >= MAX_CRITERIA {
			break;
		}
	}

	let even_share = if out.is_empty() { 0.0 } else { 1.0 / out.len() as f32 };

	out.into_iter()
		.map(|(description, weight)| Criterion {
			description,
			weight: weight.unwrap_or(even_share).clamp(0.0, 1.0),
		})
		.collect()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(items.len());

	for item in items {
		let trimmed = item.trim();

		if trimmed.is_empty() || out.iter().any(|existing| existing.eq_ignore_ascii_case(trimmed)) {
			continue;
		}

		out.push(trimmed.to_string());
	}

	out
}

/// Caller-supplied filters win; the analyzer only fills what the caller left open.
fn merge_filters(requested: &SearchFilters, analyzed: &SearchFilters) -> SearchFilters {
	SearchFilters {
		year_range: requested.year_range.or(analyzed.year_range),
		venues: if requested.venues.is_empty() {
			analyzed.venues.clone()
		} else {
			requested.venues.clone()
		},
	}
}

fn build_analyzer_messages(query: &str) -> Vec<Value> {
	let schema = serde_json::json!({
		"query_type": { "type": "BROAD_SEMANTIC|SPECIFIC_BY_TITLE|SPECIFIC_BY_NAME|PURE_METADATA|CITING_PAPERS" },
		"content_query": "string",
		"relevance_criteria": {
			"criteria": [
				{ "description": "string", "weight": 0.0 }
			]
		},
		"time_range": { "start_year": "number|null", "end_year": "number|null" },
		"venues": "string[]|null",
		"authors": "string[]|null",
		"domains": { "domains": "string[]" },
		"recent_first": false,
		"central_first": false
	});
	let system_prompt = "You analyze literature search queries for a paper search engine. \
Output must be valid JSON only and must match the provided schema exactly. \
Classify the query type; BROAD_SEMANTIC is the default for topical questions. \
The content_query is the research topic with request phrasing and metadata constraints removed. \
Extract authors, venues, a publication year range, and academic domains only when the query states them. \
Set recent_first when the query asks for new or latest work, and central_first when it asks for seminal or highly cited work. \
Write 3 to 5 distinct relevance criteria a paper should satisfy, with weights summing to 1.0.";
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema}\nQuery:\n{}",
		Value::String(query.to_string())
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
