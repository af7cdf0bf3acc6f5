use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{Error, RateLimiter, Result, RetryPolicy};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```$").expect("Code fence pattern is valid.")
});

/// Chat-completions client that asks for JSON output and returns the parsed JSON body.
#[derive(Debug)]
pub struct LlmClient {
	cfg: sift_config::LlmProviderConfig,
	client: Client,
	headers: HeaderMap,
	limiter: RateLimiter,
	retry: RetryPolicy,
}
impl LlmClient {
	pub fn new(cfg: &sift_config::LlmProviderConfig, retry: RetryPolicy) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::bearer_headers(&cfg.api_key, &cfg.default_headers)?;

		Ok(Self {
			cfg: cfg.clone(),
			client,
			headers,
			limiter: RateLimiter::per_minute(cfg.requests_per_minute),
			retry,
		})
	}

	pub fn provider_id(&self) -> &str {
		&self.cfg.provider_id
	}

	pub async fn complete(&self, messages: &[Value]) -> Result<Value> {
		self.retry
			.run(&self.cfg.provider_id, || async {
				self.limiter.acquire().await;

				self.complete_once(messages).await
			})
			.await
	}

	async fn complete_once(&self, messages: &[Value]) -> Result<Value> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"response_format": { "type": "json_object" },
			"messages": messages,
		});
		let res = self
			.client
			.post(&url)
			.headers(self.headers.clone())
			.json(&body)
			.send()
			.await
			.map_err(|err| crate::map_send_error(err, self.cfg.timeout_ms))?;
		let json = crate::read_json(res, self.cfg.timeout_ms).await?;

		parse_completion_json(json)
	}
}

/// Extracts the JSON document from a chat-completions response.
///
/// Plain JSON objects are passed through so gateways that already unwrap the content work.
pub fn parse_completion_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value = serde_json::from_str(strip_code_fence(content)).map_err(|_| {
			Error::InvalidResponse { message: "Completion content is not valid JSON.".to_string() }
		})?;

		return Ok(parsed);
	}

	if json.is_object() && json.get("choices").is_none() {
		return Ok(json);
	}

	Err(Error::InvalidResponse { message: "Completion response is missing JSON content.".to_string() })
}

pub fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();

	match CODE_FENCE.captures(trimmed).and_then(|caps| caps.get(1)) {
		Some(inner) => inner.as_str().trim(),
		None => trimmed,
	}
}
