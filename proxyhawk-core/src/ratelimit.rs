//! Rate limiter: a lazily-refilled token bucket per key, sharded by key so
//! no two keys contend on the same lock.

use crate::prelude::*;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterMode {
	Global,
	PerHost,
	PerProxy,
}

struct Bucket {
	tokens: u32,
	last_refill: Instant,
}

impl Bucket {
	fn new(burst: u32) -> Self {
		Self {
			tokens: burst,
			last_refill: Instant::now(),
		}
	}

	/// Refill lazily: compute how many intervals have elapsed since the last
	/// refill and top up, capped at `burst`.
	fn refill(&mut self, delay: Duration, burst: u32) {
		if delay.is_zero() {
			self.tokens = burst;
			return;
		}
		let elapsed = self.last_refill.elapsed();
		let intervals = (elapsed.as_secs_f64() / delay.as_secs_f64()).floor() as u32;
		if intervals > 0 {
			self.tokens = burst.min(self.tokens.saturating_add(intervals));
			self.last_refill += delay * intervals;
		}
	}
}

/// One bucket map per enabled mode. A worker asks for permission before
/// every outbound network operation; a disabled mode is a no-op.
pub struct RateLimiter {
	enabled: bool,
	delay: Duration,
	per_host: bool,
	per_proxy: bool,
	burst: u32,
	buckets: Mutex<HashMap<(LimiterMode, Strng), Bucket>>,
}

impl RateLimiter {
	pub fn new(enabled: bool, delay: Duration, per_host: bool, per_proxy: bool) -> Self {
		Self {
			enabled,
			delay,
			per_host,
			per_proxy,
			burst: 1,
			buckets: Mutex::new(HashMap::new()),
		}
	}

	pub fn disabled() -> Self {
		Self::new(false, Duration::ZERO, false, false)
	}

	/// Acquire permission to issue a request toward `host` via `proxy`. When
	/// both per-host and per-proxy are enabled, per-proxy wins (a single
	/// bucket lookup, not two).
	pub async fn acquire(&self, host: &str, proxy: &str, cancel: &tokio_util::sync::CancellationToken) {
		if !self.enabled {
			return;
		}
		let (mode, key) = if self.per_proxy {
			(LimiterMode::PerProxy, strng(proxy))
		} else if self.per_host {
			(LimiterMode::PerHost, strng(host))
		} else {
			(LimiterMode::Global, strng(""))
		};

		loop {
			let wait = {
				let mut buckets = self.buckets.lock();
				let bucket = buckets
					.entry((mode, key.clone()))
					.or_insert_with(|| Bucket::new(self.burst));
				bucket.refill(self.delay, self.burst);
				if bucket.tokens > 0 {
					bucket.tokens -= 1;
					None
				} else {
					Some(self.delay.saturating_sub(bucket.last_refill.elapsed()))
				}
			};
			match wait {
				None => return,
				Some(wait) => {
					tokio::select! {
						_ = tokio::time::sleep(wait.max(Duration::from_millis(1))) => {},
						_ = cancel.cancelled() => return,
					}
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn disabled_limiter_never_waits() {
		let rl = RateLimiter::disabled();
		let cancel = tokio_util::sync::CancellationToken::new();
		let start = tokio::time::Instant::now();
		rl.acquire("h", "p", &cancel).await;
		rl.acquire("h", "p", &cancel).await;
		assert_eq!(start.elapsed(), Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn per_proxy_wins_when_both_enabled() {
		let rl = RateLimiter::new(true, Duration::from_secs(1), true, true);
		let cancel = tokio_util::sync::CancellationToken::new();
		rl.acquire("host-a", "proxy-1", &cancel).await;
		// Second request to the same proxy but a different host should still
		// be throttled, proving the per-proxy bucket (not per-host) was used.
		let fut = rl.acquire("host-b", "proxy-1", &cancel);
		tokio::pin!(fut);
		tokio::select! {
			_ = &mut fut => panic!("should not have been immediately permitted"),
			_ = tokio::time::sleep(Duration::from_millis(500)) => {},
		}
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_aborts_pending_wait() {
		let rl = RateLimiter::new(true, Duration::from_secs(60), false, false);
		let cancel = tokio_util::sync::CancellationToken::new();
		rl.acquire("h", "p", &cancel).await;
		let cancel2 = cancel.clone();
		let handle = tokio::spawn(async move { rl.acquire("h", "p", &cancel2).await });
		cancel.cancel();
		tokio::time::timeout(Duration::from_secs(1), handle)
			.await
			.expect("acquire should return promptly after cancellation")
			.unwrap();
	}
}
