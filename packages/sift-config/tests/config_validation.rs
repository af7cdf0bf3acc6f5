use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use sift_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with<F>(edit: F) -> String
where
	F: FnOnce(&mut toml::Table),
{
	let mut value: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let root = value.as_table_mut().expect("Template config must be a table.");

	edit(root);

	toml::to_string(&value).expect("Failed to render template config.")
}

fn section<'a>(root: &'a mut toml::Table, name: &str) -> &'a mut toml::Table {
	root.get_mut(name)
		.and_then(Value::as_table_mut)
		.unwrap_or_else(|| panic!("Template config must include [{name}]."))
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("sift_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn parse(payload: &str) -> Config {
	toml::from_str(payload).expect("Failed to parse test config.")
}

fn expect_validation(payload: String, needle: &str) {
	let cfg = parse(&payload);
	let err = sift_config::validate(&cfg).expect_err("Expected validation error.");
	let message = err.to_string();

	assert!(message.contains(needle), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads() {
	let path = write_temp_config(sample_toml_with(|_| {}));
	let result = sift_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected sample config to load.");

	assert_eq!(cfg.rephrase.count, 3);
	assert_eq!(cfg.ranking.max_results, 20);
	assert_eq!(cfg.providers.llm.api_key, "test-key");
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let payload = sample_toml_with(|root| {
		for name in
			["service", "retry", "rephrase", "retrieval", "aggregation", "judge", "ranking", "pipeline"]
		{
			root.remove(name);
		}
	});
	let cfg = parse(&payload);

	sift_config::validate(&cfg).expect("Defaults must validate.");

	assert_eq!(cfg.service.log_level, "info");
	assert_eq!(cfg.retry.max_attempts, 3);
	assert!((cfg.aggregation.near_duplicate_threshold - 0.9).abs() < f32::EPSILON);
	assert!((cfg.ranking.relevance_weight - 0.6).abs() < f32::EPSILON);
	assert_eq!(cfg.pipeline.deadline_ms, 120_000);
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("sift_config_test_does_not_exist.toml");
	let err = sift_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}

#[test]
fn ranking_weights_must_sum_to_one() {
	let payload = sample_toml_with(|root| {
		section(root, "ranking").insert("recency_weight".to_string(), Value::Float(0.5));
	});

	expect_validation(payload, "must sum to 1.0");
}

#[test]
fn ranking_weights_must_be_non_negative() {
	let payload = sample_toml_with(|root| {
		let ranking = section(root, "ranking");

		ranking.insert("relevance_weight".to_string(), Value::Float(1.2));
		ranking.insert("citation_weight".to_string(), Value::Float(-0.2));
		ranking.insert("recency_weight".to_string(), Value::Float(0.0));
	});

	expect_validation(payload, "ranking.citation_weight must be a finite number");
}

#[test]
fn near_duplicate_threshold_must_be_in_range() {
	let payload = sample_toml_with(|root| {
		section(root, "aggregation")
			.insert("near_duplicate_threshold".to_string(), Value::Float(1.5));
	});

	expect_validation(payload, "aggregation.near_duplicate_threshold");
}

#[test]
fn judge_fallback_score_must_be_in_unit_range() {
	let payload = sample_toml_with(|root| {
		section(root, "judge").insert("fallback_score".to_string(), Value::Float(-0.1));
	});

	expect_validation(payload, "judge.fallback_score must be in the range 0.0-1.0.");
}

#[test]
fn retrieval_limit_is_bounded() {
	let payload = sample_toml_with(|root| {
		section(root, "retrieval").insert("limit_per_mode".to_string(), Value::Integer(500));
	});

	expect_validation(payload, "retrieval.limit_per_mode must be in the range 1-100.");
}

#[test]
fn retry_requires_at_least_one_attempt() {
	let payload = sample_toml_with(|root| {
		section(root, "retry").insert("max_attempts".to_string(), Value::Integer(0));
	});

	expect_validation(payload, "retry.max_attempts must be greater than zero.");
}

#[test]
fn label_thresholds_must_be_ordered() {
	let payload = sample_toml_with(|root| {
		let ranking = section(root, "ranking");
		let labels =
			ranking.get_mut("labels").and_then(Value::as_table_mut).expect("Missing labels.");

		labels.insert("relevant".to_string(), Value::Float(0.9));
	});

	expect_validation(payload, "ranking.labels must satisfy");
}

#[test]
fn llm_api_key_is_resolved_from_environment() {
	let payload = sample_toml_with(|root| {
		let providers = section(root, "providers");
		let llm = providers.get_mut("llm").and_then(Value::as_table_mut).expect("Missing llm.");

		llm.insert("api_key".to_string(), Value::String(String::new()));
		llm.insert("api_key_env".to_string(), Value::String("SIFT_TEST_LLM_KEY".to_string()));
	});
	let mut cfg = parse(&payload);

	sift_config::normalize(&mut cfg, |var| {
		(var == "SIFT_TEST_LLM_KEY").then(|| "from-env".to_string())
	})
	.expect("Expected env key to resolve.");

	assert_eq!(cfg.providers.llm.api_key, "from-env");
	assert_eq!(cfg.providers.search.api_key, None);
}

#[test]
fn missing_llm_key_environment_variable_is_an_error() {
	let payload = sample_toml_with(|root| {
		let providers = section(root, "providers");
		let llm = providers.get_mut("llm").and_then(Value::as_table_mut).expect("Missing llm.");

		llm.insert("api_key".to_string(), Value::String(" ".to_string()));
		llm.insert("api_key_env".to_string(), Value::String("SIFT_TEST_UNSET".to_string()));
	});
	let mut cfg = parse(&payload);
	let err = sift_config::normalize(&mut cfg, |_| None).expect_err("Expected missing env.");

	assert!(matches!(err, Error::MissingEnv { .. }), "Unexpected error: {err}");
}

#[test]
fn search_key_is_optional_and_read_from_environment() {
	let mut cfg = parse(&sample_toml_with(|_| {}));

	sift_config::normalize(&mut cfg, |var| (var == "S2_API_KEY").then(|| "s2-key".to_string()))
		.expect("Expected normalize to succeed.");

	assert_eq!(cfg.providers.search.api_key.as_deref(), Some("s2-key"));
}

#[test]
fn shipped_example_config_is_valid() {
	let mut cfg = parse(include_str!("../../../sift.example.toml"));

	sift_config::normalize(&mut cfg, |var| (var == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
		.expect("Expected example config to normalize.");
	sift_config::validate(&cfg).expect("Expected example config to validate.");

	assert_eq!(cfg.providers.llm.api_key, "sk-test");
}
