mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Aggregation, Config, Judge, LlmProviderConfig, Pipeline, Providers, Ranking, RankingLabels,
	Rephrase, Retrieval, Retry, SearchProviderConfig, Service,
};

use std::{fs, path::Path};

pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg, |var| std::env::var(var).ok())?;

	validate(&cfg)?;

	Ok(cfg)
}

/// Trims optional strings and fills API keys from the environment.
///
/// `lookup` resolves an environment variable name; `load` passes `std::env::var`.
pub fn normalize<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	let llm = &mut cfg.providers.llm;

	if llm.api_key_env.as_deref().map(|var| var.trim().is_empty()).unwrap_or(false) {
		llm.api_key_env = None;
	}
	if llm.api_key.trim().is_empty()
		&& let Some(var) = llm.api_key_env.as_deref()
	{
		llm.api_key = lookup(var).filter(|key| !key.trim().is_empty()).ok_or_else(|| {
			Error::MissingEnv { key: "providers.llm.api_key_env".to_string(), var: var.to_string() }
		})?;
	}

	let search = &mut cfg.providers.search;

	if search.api_key_env.as_deref().map(|var| var.trim().is_empty()).unwrap_or(false) {
		search.api_key_env = None;
	}
	if search.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		search.api_key = None;
	}
	if search.api_key.is_none()
		&& let Some(var) = search.api_key_env.as_deref()
	{
		search.api_key = lookup(var).filter(|key| !key.trim().is_empty());
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	let llm = &cfg.providers.llm;

	for (label, value) in [
		("providers.llm.provider_id", &llm.provider_id),
		("providers.llm.api_base", &llm.api_base),
		("providers.llm.path", &llm.path),
		("providers.llm.model", &llm.model),
		("providers.llm.api_key", &llm.api_key),
		("providers.search.provider_id", &cfg.providers.search.provider_id),
		("providers.search.api_base", &cfg.providers.search.api_base),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if !llm.temperature.is_finite() || llm.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	for (label, value) in [
		("providers.llm.timeout_ms", llm.timeout_ms),
		("providers.search.timeout_ms", cfg.providers.search.timeout_ms),
		("pipeline.deadline_ms", cfg.pipeline.deadline_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	validate_retry(cfg)?;
	validate_retrieval(cfg)?;

	let threshold = cfg.aggregation.near_duplicate_threshold;

	if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
		return Err(Error::Validation {
			message: "aggregation.near_duplicate_threshold must be in the range (0.0, 1.0]."
				.to_string(),
		});
	}

	validate_judge(cfg)?;
	validate_ranking(cfg)?;

	Ok(())
}

fn validate_retry(cfg: &Config) -> Result<()> {
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.base_delay_ms > cfg.retry.max_delay_ms {
		return Err(Error::Validation {
			message: "retry.base_delay_ms must not exceed retry.max_delay_ms.".to_string(),
		});
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if !(1..=100).contains(&retrieval.limit_per_mode) {
		return Err(Error::Validation {
			message: "retrieval.limit_per_mode must be in the range 1-100.".to_string(),
		});
	}
	if retrieval.concurrency == 0 {
		return Err(Error::Validation {
			message: "retrieval.concurrency must be greater than zero.".to_string(),
		});
	}

	for (label, weight) in [
		("retrieval.semantic_weight", retrieval.semantic_weight),
		("retrieval.keyword_weight", retrieval.keyword_weight),
	] {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	if retrieval.semantic_weight <= 0.0 || retrieval.keyword_weight <= 0.0 {
		return Err(Error::Validation {
			message: "retrieval.semantic_weight and retrieval.keyword_weight must both be greater than zero."
				.to_string(),
		});
	}
	if retrieval.snippet_chars == 0 {
		return Err(Error::Validation {
			message: "retrieval.snippet_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_judge(cfg: &Config) -> Result<()> {
	let judge = &cfg.judge;

	if judge.concurrency == 0 {
		return Err(Error::Validation {
			message: "judge.concurrency must be greater than zero.".to_string(),
		});
	}
	if !judge.fallback_score.is_finite() || !(0.0..=1.0).contains(&judge.fallback_score) {
		return Err(Error::Validation {
			message: "judge.fallback_score must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !judge.score_scale.is_finite() || judge.score_scale <= 0.0 {
		return Err(Error::Validation {
			message: "judge.score_scale must be a finite number greater than zero.".to_string(),
		});
	}
	if judge.max_snippets == 0 {
		return Err(Error::Validation {
			message: "judge.max_snippets must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	for (label, weight) in [
		("ranking.relevance_weight", ranking.relevance_weight),
		("ranking.citation_weight", ranking.citation_weight),
		("ranking.recency_weight", ranking.recency_weight),
	] {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	let sum = ranking.relevance_weight + ranking.citation_weight + ranking.recency_weight;

	if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
		return Err(Error::Validation {
			message: format!(
				"ranking.relevance_weight, ranking.citation_weight, and ranking.recency_weight must sum to 1.0 (got {sum})."
			),
		});
	}
	if !ranking.citation_norm.is_finite() || ranking.citation_norm <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.citation_norm must be a finite number greater than zero.".to_string(),
		});
	}
	if !ranking.recency_half_life_years.is_finite() || ranking.recency_half_life_years <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.recency_half_life_years must be a finite number greater than zero."
				.to_string(),
		});
	}
	if !(0.0..=1.0).contains(&ranking.unknown_year_recency) {
		return Err(Error::Validation {
			message: "ranking.unknown_year_recency must be in the range 0.0-1.0.".to_string(),
		});
	}
	if ranking.max_results == 0 {
		return Err(Error::Validation {
			message: "ranking.max_results must be greater than zero.".to_string(),
		});
	}

	let labels = &ranking.labels;

	if !(0.0..=1.0).contains(&labels.somewhat_relevant)
		|| labels.somewhat_relevant > labels.relevant
		|| labels.relevant > labels.highly_relevant
		|| labels.highly_relevant > 1.0
	{
		return Err(Error::Validation {
			message: "ranking.labels must satisfy 0.0 <= somewhat_relevant <= relevant <= highly_relevant <= 1.0."
				.to_string(),
		});
	}

	Ok(())
}
