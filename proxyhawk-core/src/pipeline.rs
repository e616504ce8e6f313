//! Worker pool and pipeline. A fixed pool of N workers drains an unbounded
//! candidate queue; each worker carries one candidate through detection,
//! baseline validation, classification and the security probe battery, then
//! hands the sealed result to the aggregator. A per-candidate watchdog and
//! panic recovery keep one bad candidate from stalling or crashing the pool.

use crate::aggregate::Aggregator;
use crate::classify::Classifier;
use crate::config::Config;
use crate::detector::Detector;
use crate::error::ProxyHawkError;
use crate::events::{EventPublisher, LogLevel};
use crate::httpclient::{self, RequestSpec};
use crate::oob::OobClient;
use crate::prelude::*;
use crate::probes::{self, ProbeContext};
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{RequestForm, TransportFactory};
use crate::types::{CandidateState, FindingKind, ProbeResult, ProxyCandidate, ProxyResult, ProxyType};
use crate::validate::{self, ResponseValidator};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Pipeline {
	config: Arc<Config>,
	factory: Arc<TransportFactory>,
	rate_limiter: Arc<RateLimiter>,
	retry: Arc<RetryPolicy>,
	oob: OobClient,
	aggregator: Arc<Aggregator>,
	events: EventPublisher,
	cancel: CancellationToken,
}

impl Pipeline {
	pub fn new(config: Arc<Config>, events: EventPublisher, cancel: CancellationToken) -> Self {
		let factory = TransportFactory::new(config.timeout, config.insecure_skip_verify);
		let rate_limiter = RateLimiter::new(
			config.rate_limit_enabled,
			config.rate_limit_delay,
			config.rate_limit_per_host,
			config.rate_limit_per_proxy,
		);
		let retry = if config.retry_enabled {
			RetryPolicy {
				enabled: true,
				max_retries: config.max_retries,
				initial_delay: config.initial_retry_delay,
				max_delay: config.max_retry_delay,
				backoff_factor: config.backoff_factor,
				retryable_substrings: config.retryable_errors.clone(),
			}
		} else {
			RetryPolicy::disabled()
		};
		let oob = OobClient::spawn(config.interactsh_url.clone(), config.interactsh_token.clone(), cancel.clone());
		Self {
			factory: Arc::new(factory),
			rate_limiter: Arc::new(rate_limiter),
			retry: Arc::new(retry),
			oob,
			aggregator: Arc::new(Aggregator::new()),
			events,
			cancel,
			config,
		}
	}

	pub fn aggregator(&self) -> Arc<Aggregator> {
		self.aggregator.clone()
	}

	fn watchdog(&self) -> Duration {
		Duration::from_secs(30).max(Duration::from_secs(3) * self.config.concurrency as u32)
	}

	/// Feed every candidate through a fixed `config.concurrency`-worker pool.
	/// Workers share one `mpsc::Receiver` behind a mutex; the feeder closes
	/// the channel by dropping its only sender once every candidate has been
	/// queued.
	pub async fn run(&self, candidates: Vec<ProxyCandidate>) {
		let total = candidates.len();
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ProxyCandidate>();
		for c in candidates {
			if tx.send(c).is_err() {
				break;
			}
		}
		drop(tx);

		let rx = Arc::new(AsyncMutex::new(rx));
		let completed = Arc::new(AtomicUsize::new(0));
		let worker_count = self.config.concurrency.max(1);
		let watchdog = self.watchdog();

		let mut workers = Vec::with_capacity(worker_count);
		for _ in 0..worker_count {
			let rx = rx.clone();
			let this = self.clone();
			let completed = completed.clone();
			workers.push(tokio::spawn(async move {
				loop {
					if this.cancel.is_cancelled() {
						break;
					}
					let candidate = {
						let mut guard = rx.lock().await;
						guard.recv().await
					};
					let Some(candidate) = candidate else { break };

					let url = candidate.display_url();
					this.events.proxy_started(url.clone());

					let outcome = AssertUnwindSafe(this.process_one(candidate.clone(), watchdog)).catch_unwind().await;
					let sealed = match outcome {
						Ok(result) => result,
						Err(_) => {
							this.events.log(LogLevel::Error, format!("worker panicked while processing {url}"));
							ProxyResult::loaded(candidate).seal()
						},
					};
					this.aggregator.record(sealed.clone());
					let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
					this.events.progress(n, total);
					this.events.proxy_finished(sealed);
				}
			}));
		}

		for w in workers {
			let _ = w.await;
		}
	}

	/// Carry one candidate through the full pipeline: type detection,
	/// baseline validation, classification and the probe battery, bounded by
	/// a watchdog.
	async fn process_one(&self, candidate: ProxyCandidate, watchdog: Duration) -> ProxyResult {
		match tokio::time::timeout(watchdog, self.process_one_inner(candidate.clone())).await {
			Ok(result) => result,
			Err(_) => {
				let mut result = ProxyResult::loaded(candidate);
				result.canceled = true;
				result.trace("watchdog timeout exceeded");
				result.seal()
			},
		}
	}

	async fn process_one_inner(&self, candidate: ProxyCandidate) -> ProxyResult {
		let mut result = ProxyResult::loaded(candidate.clone());
		let proxy_key = candidate.display_url();

		self.rate_limiter.acquire(&candidate.host, &proxy_key, &self.cancel).await;

		let baseline = self
			.retry
			.run(&self.cancel, || self.detect_and_validate(&candidate))
			.await;

		let baseline = match baseline {
			Ok(baseline) => baseline,
			Err(e) => {
				result.trace(format!("baseline check failed: {e}"));
				result.state = CandidateState::Validated;
				return result.seal();
			},
		};

		result.proxy_type = baseline.proxy_type;
		result.working = baseline.working;
		result.median_speed = baseline.median_speed;
		result.probe_results = baseline.probe_results;
		result.state = CandidateState::BaselineTested;

		// An undetected type or a failed baseline both mean there is nothing
		// trustworthy left to probe: the proxy is sealed as non-working without
		// ever reaching the security probe battery.
		if result.proxy_type == ProxyType::Unknown || !result.working {
			return result.seal();
		}

		self.rate_limiter.acquire(&candidate.host, &proxy_key, &self.cancel).await;
		let classifier = Classifier::new(&self.factory, &self.config.cloud_providers);
		let classification = classifier.classify(&candidate, result.proxy_type).await;
		result.real_ip = classifier.real_ip().await;
		result.apparent_ip = classification.apparent_ip;
		result.anonymous = classification.anonymous;
		result.elite = classification.elite;
		result.cloud_provider = classification.cloud_provider.map(|s| strng(s));
		result.metadata_access = classification.metadata_access;
		result.state = CandidateState::Probing;

		if self.cancel.is_cancelled() {
			result.canceled = true;
			return result.seal();
		}

		self.rate_limiter.acquire(&candidate.host, &proxy_key, &self.cancel).await;
		let ctx = ProbeContext {
			factory: &self.factory,
			candidate: &candidate,
			proxy_type: result.proxy_type,
			advanced: &self.config.advanced_checks,
			cloud_providers: &self.config.cloud_providers,
			oob: Some(&self.oob),
			per_probe_timeout: self.config.timeout,
			cancel: &self.cancel,
		};
		if !probes::run_battery(&ctx, &mut result.findings).await {
			result.canceled = true;
		}

		// Forwarding headers downgrade "elite" to "anonymous" without unsetting
		// anonymity itself: the proxy still hides the real IP, but it leaks its
		// own presence to the origin.
		if result.findings.has(FindingKind::HostHeaderInjection) {
			result.elite = false;
		}

		result.seal()
	}

	/// One retryable unit: detect the proxy's type, then run the baseline
	/// test-URL battery through it. Combined into a single retryable step
	/// since a transient network failure in either invalidates both.
	async fn detect_and_validate(&self, candidate: &ProxyCandidate) -> Result<BaselineOutcome, ProxyHawkError> {
		let detector = Detector::new(self.config.timeout);
		let proxy_type = detector.detect(candidate).await;
		if proxy_type == ProxyType::Unknown {
			return Ok(BaselineOutcome {
				proxy_type,
				working: false,
				median_speed: Duration::ZERO,
				probe_results: Vec::new(),
			});
		}

		let validator = ResponseValidator::from_config(&self.config);
		let urls = validate::test_url_list(&self.config.test_urls);
		let mut probe_results = Vec::with_capacity(urls.len());
		let mut decisions = Vec::with_capacity(urls.len());
		let mut durations = Vec::with_capacity(urls.len());

		for (url, required) in &urls {
			let started = Instant::now();
			let outcome = self.fetch_test_url(candidate, proxy_type, url).await;
			let elapsed = started.elapsed();
			durations.push(elapsed);
			match outcome {
				Ok(resp) => {
					let passed = validator.is_valid(&resp);
					decisions.push((passed, *required));
					probe_results.push(ProbeResult::ok(url, elapsed, resp.status.unwrap_or(0), resp.body.len()));
				},
				Err(e) => {
					decisions.push((false, *required));
					probe_results.push(ProbeResult::err(url, elapsed, e.to_string()));
				},
			}
		}

		durations.sort();
		let median_speed = durations.get(durations.len() / 2).copied().unwrap_or(Duration::ZERO);

		Ok(BaselineOutcome {
			proxy_type,
			working: validate::decide_working(&decisions),
			median_speed,
			probe_results,
		})
	}

	async fn fetch_test_url(&self, candidate: &ProxyCandidate, proxy_type: ProxyType, url: &str) -> std::io::Result<httpclient::RawResponse> {
		let parsed = url::Url::parse(url).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
		let host = parsed.host_str().ok_or_else(|| std::io::Error::other("test url has no host"))?;
		let port = parsed.port_or_known_default().unwrap_or(80);
		let is_tls = parsed.scheme() == "https";

		let (mut stream, form) = self.factory.connect(candidate, proxy_type, host, port, is_tls).await?;
		let target = match form {
			RequestForm::AbsoluteViaProxy => url.to_string(),
			RequestForm::Origin => {
				let mut p = parsed.path().to_string();
				if let Some(q) = parsed.query() {
					p.push('?');
					p.push_str(q);
				}
				if p.is_empty() {
					p.push('/');
				}
				p
			},
		};
		let mut spec = RequestSpec::get(target, host).header("User-Agent", self.config.user_agent.clone());
		for (k, v) in &self.config.default_headers {
			spec = spec.header(k.clone(), v.clone());
		}
		if let Some(auth) = self.factory.auth_header(candidate, &auth_policy(&self.config)) {
			spec = spec.header("Proxy-Authorization", auth);
		}
		httpclient::send(&mut stream, &spec, form, self.config.timeout).await
	}
}

fn auth_policy(config: &Config) -> crate::transport::AuthPolicy {
	crate::transport::AuthPolicy {
		auth_enabled: config.auth_enabled,
		default_username: config.default_username.clone(),
		default_password: config.default_password.clone(),
	}
}

struct BaselineOutcome {
	proxy_type: ProxyType,
	working: bool,
	median_speed: Duration,
	probe_results: Vec<ProbeResult>,
}
