pub mod llm;
pub mod rate_limit;
pub mod retry;
pub mod scholar;

mod error;

pub use error::{Error, Result};
pub use llm::LlmClient;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use scholar::{ScholarClient, SearchFilters, SearchHit, SearchMode, YearRange};

use std::time::Duration;

use reqwest::{
	Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use serde_json::{Map, Value};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub fn bearer_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = default_header_map(default_headers)?;

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	Ok(headers)
}

/// Headers for backends that take the key in a named header and work without one.
pub fn api_key_headers(
	header: &'static str,
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = default_header_map(default_headers)?;

	if let Some(key) = api_key {
		headers.insert(HeaderName::from_static(header), key.parse()?);
	}

	Ok(headers)
}

pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}

	raw.strip_suffix('s')
		.and_then(|secs| secs.parse::<f64>().ok())
		.filter(|secs| secs.is_finite() && *secs >= 0.0)
		.map(Duration::from_secs_f64)
}

fn default_header_map(default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(headers)
}

pub(crate) fn map_send_error(err: reqwest::Error, timeout_ms: u64) -> Error {
	if err.is_timeout() { Error::Timeout { timeout_ms } } else { Error::Reqwest(err) }
}

pub(crate) async fn read_json(res: Response, timeout_ms: u64) -> Result<Value> {
	let status = res.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		return Err(Error::RateLimited { retry_after: parse_retry_after(res.headers()) });
	}
	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();
		let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

		return Err(Error::Status { status: status.as_u16(), body });
	}

	res.json().await.map_err(|err| map_send_error(err, timeout_ms))
}
