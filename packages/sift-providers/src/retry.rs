use std::{future::Future, time::Duration};

use rand::Rng;

use crate::{Error, Result};

/// Share of the computed delay added as random jitter.
const JITTER_RATIO: f64 = 0.25;

/// Bounded exponential backoff applied at every backend call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub jitter: bool,
}
impl RetryPolicy {
	pub fn from_config(cfg: &sift_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
			jitter: cfg.jitter,
		}
	}

	pub fn no_retry() -> Self {
		Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO, jitter: false }
	}

	/// Delay before the attempt following `attempt` (zero-based).
	///
	/// A server-provided `Retry-After` wins when it is longer than the computed delay.
	pub fn backoff(&self, attempt: u32, err: &Error) -> Duration {
		let factor = 2_u32.saturating_pow(attempt);
		let computed = self.base_delay.saturating_mul(factor).min(self.max_delay);
		let computed = if self.jitter && !computed.is_zero() {
			let extra = rand::thread_rng().gen_range(0.0..=JITTER_RATIO);

			computed.mul_f64(1.0 + extra)
		} else {
			computed
		};

		match err {
			Error::RateLimited { retry_after: Some(server) } => computed.max(*server),
			_ => computed,
		}
	}

	pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempt = 0_u32;

		loop {
			match operation().await {
				Ok(value) => return Ok(value),
				Err(err) => {
					if !err.is_retryable() || attempt + 1 >= self.max_attempts {
						return Err(err);
					}

					let delay = self.backoff(attempt, &err);

					tracing::warn!(
						backend = label,
						attempt = attempt + 1,
						max_attempts = self.max_attempts,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"Retrying backend call after transient error."
					);
					tokio::time::sleep(delay).await;

					attempt += 1;
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	};

	use super::*;

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(4),
			jitter: false,
		}
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy {
			max_attempts: 5,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(350),
			jitter: false,
		};
		let err = Error::Timeout { timeout_ms: 10 };

		assert_eq!(policy.backoff(0, &err), Duration::from_millis(100));
		assert_eq!(policy.backoff(1, &err), Duration::from_millis(200));
		assert_eq!(policy.backoff(2, &err), Duration::from_millis(350));
	}

	#[test]
	fn backoff_respects_retry_after() {
		let policy = policy(3);
		let err = Error::RateLimited { retry_after: Some(Duration::from_millis(50)) };

		assert_eq!(policy.backoff(0, &err), Duration::from_millis(50));
	}

	#[test]
	fn jitter_stays_within_ratio() {
		let policy = RetryPolicy { jitter: true, ..policy(3) };
		let err = Error::Timeout { timeout_ms: 10 };

		for _ in 0..32 {
			let delay = policy.backoff(1, &err);

			assert!(delay >= Duration::from_millis(2));
			assert!(delay <= Duration::from_micros(2_500));
		}
	}

	#[tokio::test]
	async fn retries_rate_limits_until_success() {
		let calls = Arc::new(AtomicU32::new(0));
		let counter = calls.clone();
		let value = policy(3)
			.run("test", || {
				let counter = counter.clone();

				async move {
					if counter.fetch_add(1, Ordering::SeqCst) < 2 {
						Err(Error::RateLimited { retry_after: None })
					} else {
						Ok(7)
					}
				}
			})
			.await
			.expect("Expected success on third attempt.");

		assert_eq!(value, 7);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn stops_after_max_attempts() {
		let calls = Arc::new(AtomicU32::new(0));
		let counter = calls.clone();
		let err = policy(2)
			.run("test", || {
				let counter = counter.clone();

				async move {
					counter.fetch_add(1, Ordering::SeqCst);

					Err::<(), _>(Error::RateLimited { retry_after: None })
				}
			})
			.await
			.expect_err("Expected exhausted retries.");

		assert!(matches!(err, Error::RateLimited { .. }));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn does_not_retry_permanent_errors() {
		let calls = Arc::new(AtomicU32::new(0));
		let counter = calls.clone();
		let err = policy(5)
			.run("test", || {
				let counter = counter.clone();

				async move {
					counter.fetch_add(1, Ordering::SeqCst);

					Err::<(), _>(Error::InvalidResponse { message: "bad".to_string() })
				}
			})
			.await
			.expect_err("Expected permanent error.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
