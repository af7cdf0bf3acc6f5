use std::{collections::BTreeMap, sync::Arc};

use serde::Deserialize;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
	AnalysisResult, CompletionRequest, Diagnostics, FailureKind, JudgedPaper, LanguageModel,
	LlmTask, Paper, SearchContext, Stage, text,
};

#[derive(Debug, Deserialize)]
struct JudgeOutput {
	score: f64,
	#[serde(default, alias = "rationale")]
	reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
	pub relevance_score: f32,
	pub rationale: String,
}

#[derive(Debug, Clone, Default)]
pub struct JudgeOutcome {
	pub papers: Vec<JudgedPaper>,
	pub fallbacks: usize,
	pub deadline_hit: bool,
}

enum Failure {
	Provider(sift_providers::Error),
	Schema(String),
	NoResult,
}

/// Judges every paper concurrently. Never fails: a paper whose judgement failed, or was still
/// running at the deadline, keeps the configured fallback score with `judged = false`.
pub async fn judge(
	ctx: &SearchContext,
	analysis: &AnalysisResult,
	papers: Vec<Paper>,
	llm: Arc<dyn LanguageModel>,
	diagnostics: &mut Diagnostics,
) -> JudgeOutcome {
	let semaphore = Arc::new(Semaphore::new(ctx.judge.concurrency.max(1) as usize));
	let score_scale = ctx.judge.score_scale;
	let mut tasks = JoinSet::new();

	for (idx, paper) in papers.iter().enumerate() {
		let request = CompletionRequest {
			task: LlmTask::Judge,
			messages: build_judge_messages(ctx, analysis, paper),
		};
		let semaphore = semaphore.clone();
		let llm = llm.clone();

		tasks.spawn(async move {
			let Ok(_permit) = semaphore.acquire_owned().await else {
				return (idx, Err(Failure::NoResult));
			};
			let verdict = match llm.complete(&request).await {
				Ok(raw) => parse_verdict(raw, score_scale).map_err(Failure::Schema),
				Err(err) => Err(Failure::Provider(err)),
			};

			(idx, verdict)
		});
	}

	let mut verdicts: BTreeMap<usize, Result<Verdict, Failure>> = BTreeMap::new();
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

		if let Ok((idx, verdict)) = joined {
			verdicts.insert(idx, verdict);
		}
	}

	if deadline_hit {
		// Verdicts that are already in count; the rest fall back.
		while let Some(joined) = tasks.try_join_next() {
			if let Ok((idx, verdict)) = joined {
				verdicts.insert(idx, verdict);
			}
		}

		tasks.abort_all();
	}

	while tasks.join_next().await.is_some() {}

	let mut outcome = JudgeOutcome { deadline_hit, ..JudgeOutcome::default() };

	for (idx, paper) in papers.into_iter().enumerate() {
		let failure = match verdicts.remove(&idx) {
			Some(Ok(verdict)) => {
				outcome.papers.push(JudgedPaper {
					paper,
					relevance_score: verdict.relevance_score,
					rationale: verdict.rationale,
					judged: true,
				});

				continue;
			},
			Some(Err(failure)) => failure,
			None if deadline_hit => {
				diagnostics.push(
					Stage::Judge,
					FailureKind::Timeout,
					Some(paper.canonical_id.clone()),
					"Search deadline passed before the judgement finished.",
				);

				outcome.papers.push(fallback(paper, ctx.judge.fallback_score));
				outcome.fallbacks += 1;

				continue;
			},
			None => Failure::NoResult,
		};
		let (kind, message) = match failure {
			Failure::Provider(err) => (FailureKind::from_provider(&err), err.to_string()),
			Failure::Schema(reason) => (FailureKind::InvalidResponse, reason),
			Failure::NoResult =>
				(FailureKind::Panicked, "Judgement task ended without a result.".to_string()),
		};

		diagnostics.push(Stage::Judge, kind, Some(paper.canonical_id.clone()), message);

		outcome.papers.push(fallback(paper, ctx.judge.fallback_score));
		outcome.fallbacks += 1;
	}

	tracing::info!(
		papers = outcome.papers.len(),
		fallbacks = outcome.fallbacks,
		deadline_hit,
		"Judging finished."
	);

	outcome
}

/// Validates a `{score, reasoning}` answer and maps the score into [0, 1].
pub fn parse_verdict(raw: Value, score_scale: f32) -> Result<Verdict, String> {
	let output: JudgeOutput = serde_json::from_value(raw)
		.map_err(|err| format!("Judge output does not match the schema: {err}"))?;

	if !output.score.is_finite() {
		return Err("Judge score is not a finite number.".to_string());
	}

	let scale = if score_scale > 0.0 { score_scale as f64 } else { 1.0 };
	let relevance_score = (output.score / scale).clamp(0.0, 1.0) as f32;

	Ok(Verdict {
		relevance_score,
		rationale: output.reasoning.map(|text| text.trim().to_string()).unwrap_or_default(),
	})
}

fn fallback(paper: Paper, fallback_score: f32) -> JudgedPaper {
	JudgedPaper {
		paper,
		relevance_score: fallback_score,
		rationale: String::new(),
		judged: false,
	}
}

fn build_judge_messages(ctx: &SearchContext, analysis: &AnalysisResult, paper: &Paper) -> Vec<Value> {
	let max_snippet_chars = ctx.judge.max_snippet_chars as usize;
	let criteria: Vec<Value> = analysis
		.criteria
		.iter()
		.map(|criterion| {
			serde_json::json!({ "description": criterion.description, "weight": criterion.weight })
		})
		.collect();
	let evidence: Vec<String> = paper
		.snippets
		.iter()
		.take(ctx.judge.max_snippets.max(1) as usize)
		.map(|snippet| text::truncate_graphemes(&snippet.text, max_snippet_chars))
		.collect();
	let paper_json = serde_json::json!({
		"title": paper.title,
		"year": paper.year,
		"authors": paper.authors,
		"evidence": evidence,
	});
	let schema = serde_json::json!({ "score": 0.0, "reasoning": "string" });
	let system_prompt = "You judge how relevant one research paper is to a literature search. \
Output must be valid JSON only and must match the provided schema exactly. \
Score from 0.0 (unrelated) to SCORE_SCALE (fully satisfies every criterion), weighing criteria by their weights. \
Base the score only on the evidence provided. Keep the reasoning to one or two sentences.";
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema}\nConstraints:\n- SCORE_SCALE = {}\nQuery:\n{}\nCriteria:\n{}\nPaper:\n{paper_json}",
		ctx.judge.score_scale,
		Value::String(ctx.query.clone()),
		Value::Array(criteria),
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
