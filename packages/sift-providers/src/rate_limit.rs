//! Client-side token bucket shared by every concurrent call to one backend.
//!
//! Callers reserve a token under a short synchronous lock and sleep outside of it, so the
//! lock is never held across an await point. Reservations may drive the balance negative;
//! the deficit is the queue of callers already waiting for refill.

use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
	bucket: Option<Mutex<Bucket>>,
}
impl RateLimiter {
	pub fn unlimited() -> Self {
		Self { bucket: None }
	}

	/// Zero means unlimited. Bursts are capped to a tenth of the per-minute budget.
	pub fn per_minute(requests_per_minute: u32) -> Self {
		if requests_per_minute == 0 {
			return Self::unlimited();
		}

		let capacity = (requests_per_minute / 10).max(1) as f64;
		let refill_per_sec = requests_per_minute as f64 / 60.0;

		Self {
			bucket: Some(Mutex::new(Bucket {
				capacity,
				tokens: capacity,
				refill_per_sec,
				updated_at: Instant::now(),
			})),
		}
	}

	/// Takes one token and returns how long the caller must wait before using it.
	pub fn reserve(&self) -> Option<Duration> {
		let bucket = self.bucket.as_ref()?;
		let mut bucket = match bucket.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};

		bucket.reserve(Instant::now())
	}

	pub async fn acquire(&self) {
		if let Some(wait) = self.reserve() {
			tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limiter delaying call.");
			tokio::time::sleep(wait).await;
		}
	}
}

#[derive(Debug)]
struct Bucket {
	capacity: f64,
	tokens: f64,
	refill_per_sec: f64,
	updated_at: Instant,
}
impl Bucket {
	fn reserve(&mut self, now: Instant) -> Option<Duration> {
		let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();

		self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
		self.updated_at = now;
		self.tokens -= 1.0;

		if self.tokens >= 0.0 {
			return None;
		}

		Some(Duration::from_secs_f64(-self.tokens / self.refill_per_sec))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unlimited_never_waits() {
		let limiter = RateLimiter::per_minute(0);

		for _ in 0..100 {
			assert!(limiter.reserve().is_none());
		}
	}

	#[test]
	fn burst_is_free_then_callers_queue() {
		let limiter = RateLimiter::per_minute(10);

		assert!(limiter.reserve().is_none());

		let first = limiter.reserve().expect("Expected a wait after the burst.");
		let second = limiter.reserve().expect("Expected a longer wait.");

		assert!(first > Duration::from_millis(5_500) && first <= Duration::from_millis(6_001));
		assert!(second > first);
	}

	#[test]
	fn tokens_refill_over_time() {
		let start = Instant::now();
		let mut bucket =
			Bucket { capacity: 2.0, tokens: 0.0, refill_per_sec: 1.0, updated_at: start };

		assert!(bucket.reserve(start + Duration::from_secs(3)).is_none());
		assert!(bucket.reserve(start + Duration::from_secs(3)).is_none());
		assert!(bucket.reserve(start + Duration::from_secs(3)).is_some());
	}
}
