//! Aggregator. The canonical result vector, behind a single mutex so any
//! worker can append a sealed `ProxyResult` without the pipeline threading
//! a return channel back through every stage.

use crate::prelude::*;
use crate::types::{ProxyResult, RunSummary};
use parking_lot::Mutex;

#[derive(Default)]
pub struct Aggregator {
	results: Mutex<Vec<ProxyResult>>,
	started_at: once_cell::sync::OnceCell<Instant>,
}

impl Aggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append one sealed result, handed off as each candidate finishes its
	/// pipeline.
	pub fn record(&self, result: ProxyResult) {
		let _ = self.started_at.get_or_init(Instant::now);
		self.results.lock().push(result);
	}

	pub fn len(&self) -> usize {
		self.results.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All results collected so far, in completion order.
	pub fn all(&self) -> Vec<ProxyResult> {
		self.results.lock().clone()
	}

	pub fn working(&self) -> Vec<ProxyResult> {
		self.results.lock().iter().filter(|r| r.working).cloned().collect()
	}

	pub fn working_and_anonymous(&self) -> Vec<ProxyResult> {
		self.results.lock().iter().filter(|r| r.working && r.anonymous).cloned().collect()
	}

	/// Compute summary counts once, at finalization.
	pub fn summarize(&self) -> RunSummary {
		let results = self.results.lock();
		let total = results.len();
		let working = results.iter().filter(|r| r.working).count();
		let anonymous = results.iter().filter(|r| r.anonymous).count();
		let cloud = results.iter().filter(|r| r.cloud_provider.is_some()).count();
		let with_findings = results.iter().filter(|r| !r.findings.is_empty()).count();

		let mean_success_rate = if total == 0 {
			0.0
		} else {
			let sum: f64 = results
				.iter()
				.map(|r| r.probe_results.iter().filter(|p| p.success).count() as f64 / r.probe_results.len().max(1) as f64)
				.sum();
			sum / total as f64
		};

		let wall_clock = self.started_at.get().map(|s| s.elapsed()).unwrap_or_default();

		RunSummary {
			total,
			working,
			anonymous,
			cloud,
			with_findings,
			mean_success_rate,
			wall_clock,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ProxyCandidate;
	use crate::types::Scheme;

	fn candidate() -> ProxyCandidate {
		ProxyCandidate {
			scheme: Scheme::Http,
			host: strng("1.2.3.4"),
			port: 8080,
			username: None,
			password: None,
		}
	}

	#[test]
	fn summarize_counts_working_and_anonymous() {
		let agg = Aggregator::new();
		let mut a = ProxyResult::loaded(candidate()).seal();
		a.working = true;
		a.anonymous = true;
		let mut b = ProxyResult::loaded(candidate()).seal();
		b.working = false;
		agg.record(a);
		agg.record(b);

		let summary = agg.summarize();
		assert_eq!(summary.total, 2);
		assert_eq!(summary.working, 1);
		assert_eq!(summary.anonymous, 1);
		assert_eq!(agg.working_and_anonymous().len(), 1);
	}
}
