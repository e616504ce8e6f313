//! Retry engine, backed by the `backoff` crate for the capped-exponential-
//! with-jitter delay sequence.

use crate::error::ProxyHawkError;
use crate::prelude::*;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;

pub struct RetryPolicy {
	pub enabled: bool,
	pub max_retries: u32,
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub retryable_substrings: Vec<String>,
}

impl RetryPolicy {
	pub fn disabled() -> Self {
		Self {
			enabled: false,
			max_retries: 0,
			initial_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			backoff_factor: 2.0,
			retryable_substrings: Vec::new(),
		}
	}

	fn build_backoff(&self) -> backoff::ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_delay)
			.with_multiplier(self.backoff_factor)
			.with_max_interval(self.max_delay)
			.with_randomization_factor(0.2)
			.with_max_elapsed_time(None)
			.build()
	}

	/// Re-issue `op` until it succeeds, a non-retryable error surfaces, the
	/// retry budget is exhausted, or `cancel` fires. `max_retries = 0` means
	/// a single attempt, never retried.
	pub async fn run<T, F, Fut>(
		&self,
		cancel: &tokio_util::sync::CancellationToken,
		mut op: F,
	) -> Result<T, ProxyHawkError>
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = Result<T, ProxyHawkError>>,
	{
		let mut backoff = self.build_backoff();
		let mut attempt = 0u32;
		loop {
			match op().await {
				Ok(v) => return Ok(v),
				Err(e) if !self.enabled || attempt >= self.max_retries || !e.matches_retryable(&self.retryable_substrings) => {
					return Err(e);
				},
				Err(e) => {
					let Some(delay) = backoff.next_backoff() else {
						return Err(e);
					};
					attempt += 1;
					tokio::select! {
						_ = tokio::time::sleep(delay) => {},
						_ = cancel.cancelled() => return Err(e),
					}
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorCategory;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn net_err() -> ProxyHawkError {
		ProxyHawkError::new(ErrorCategory::Network, "test_op", "connection refused").retryable(true)
	}

	#[tokio::test(start_paused = true)]
	async fn zero_retries_means_single_attempt() {
		let policy = RetryPolicy { enabled: true, max_retries: 0, ..RetryPolicy::disabled() };
		let attempts = AtomicU32::new(0);
		let cancel = tokio_util::sync::CancellationToken::new();
		let result: Result<(), _> = policy
			.run(&cancel, || async {
				attempts.fetch_add(1, Ordering::SeqCst);
				Err(net_err())
			})
			.await;
		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn retries_until_success() {
		let policy = RetryPolicy { enabled: true, max_retries: 5, ..RetryPolicy::disabled() };
		let attempts = AtomicU32::new(0);
		let cancel = tokio_util::sync::CancellationToken::new();
		let result = policy
			.run(&cancel, || async {
				let n = attempts.fetch_add(1, Ordering::SeqCst);
				if n < 2 { Err(net_err()) } else { Ok(42) }
			})
			.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn non_retryable_error_surfaces_immediately() {
		let policy = RetryPolicy { enabled: true, max_retries: 5, ..RetryPolicy::disabled() };
		let attempts = AtomicU32::new(0);
		let cancel = tokio_util::sync::CancellationToken::new();
		let result: Result<(), _> = policy
			.run(&cancel, || async {
				attempts.fetch_add(1, Ordering::SeqCst);
				Err(ProxyHawkError::new(ErrorCategory::Validation, "test_op", "bad input"))
			})
			.await;
		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}
}
