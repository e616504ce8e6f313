//! Security probe battery. Each probe is an independent check run against
//! one already-typed, already-baseline-tested candidate; a probe's own
//! failure is always recorded as inconclusive, never treated as a clean
//! negative.

pub mod host_header;
pub mod localhost;
pub mod rebinding;
pub mod smuggling;
pub mod ssrf;

use crate::config::{AdvancedChecks, CloudProvider};
use crate::oob::OobClient;
use crate::prelude::*;
use crate::transport::TransportFactory;
use crate::types::{Evidence, FindingKind, ProbeOutcome, ProxyCandidate, ProxyType, SecurityFindings};
use tokio_util::sync::CancellationToken;

/// Everything a single probe needs; built once per candidate by the worker
/// that owns it.
pub struct ProbeContext<'a> {
	pub factory: &'a TransportFactory,
	pub candidate: &'a ProxyCandidate,
	pub proxy_type: ProxyType,
	pub advanced: &'a AdvancedChecks,
	pub cloud_providers: &'a [CloudProvider],
	pub oob: Option<&'a OobClient>,
	pub per_probe_timeout: Duration,
	pub cancel: &'a CancellationToken,
}

/// Run every enabled probe in sequence against one candidate, folding
/// outcomes into `findings`. Probes never run concurrently with each other
/// for the same candidate — only candidates run concurrently with each
/// other. Checked between every probe (and inside each probe's own network
/// waits via `ctx.cancel`); returns `false` the moment cancellation is
/// observed, leaving any probes not yet started un-run.
pub async fn run_battery(ctx: &ProbeContext<'_>, findings: &mut SecurityFindings) -> bool {
	macro_rules! bail_if_cancelled {
		() => {
			if ctx.cancel.is_cancelled() {
				return false;
			}
		};
	}

	record(findings, "ssrf_internal", ssrf::probe_internal(ctx).await);
	bail_if_cancelled!();
	record(findings, "ssrf_cloud_metadata", ssrf::probe_cloud_metadata(ctx).await);
	bail_if_cancelled!();
	record(findings, "ssrf_parser_differential", ssrf::probe_parser_differential(ctx).await);
	bail_if_cancelled!();

	if ctx.advanced.test_host_header_injection {
		record(findings, "host_header_injection", host_header::probe(ctx).await);
		bail_if_cancelled!();
	}
	if ctx.advanced.test_protocol_smuggling {
		record(findings, "protocol_smuggling", smuggling::probe(ctx).await);
		bail_if_cancelled!();
	}
	if ctx.advanced.test_dns_rebinding {
		record(findings, "dns_rebinding", rebinding::probe(ctx).await);
		bail_if_cancelled!();
	}

	let (outcome, open_ports) = localhost::probe(ctx).await;
	let evidence = (!open_ports.is_empty()).then(|| {
		(
			FindingKind::OpenLocalhost,
			Evidence {
				probe_id: strng("open_localhost"),
				request_fingerprint: "n/a".to_string(),
				response_fingerprint: format!("{open_ports:?}"),
				oob_token_match: None,
			},
		)
	});
	findings.open_ports = open_ports;
	record(findings, "open_localhost", (outcome, evidence));
	true
}

/// `kind`/`evidence` only matter on a `Positive` outcome; `SecurityFindings`
/// is a no-op for `Negative` and only records the probe id for
/// `Inconclusive`.
fn record(findings: &mut SecurityFindings, probe_id: &str, outcome: (ProbeOutcome, Option<(FindingKind, Evidence)>)) {
	let (result, kind_evidence) = outcome;
	match (result, kind_evidence) {
		(ProbeOutcome::Positive, Some((kind, evidence))) => {
			findings.record(ProbeOutcome::Positive, kind, probe_id, Some(evidence));
		},
		(ProbeOutcome::Positive, None) => {
			findings.record(ProbeOutcome::Inconclusive, FindingKind::SsrfInternal, probe_id, None);
		},
		(ProbeOutcome::Negative, _) => {
			findings.record(ProbeOutcome::Negative, FindingKind::SsrfInternal, probe_id, None);
		},
		(ProbeOutcome::Inconclusive, _) => {
			findings.record(ProbeOutcome::Inconclusive, FindingKind::SsrfInternal, probe_id, None);
		},
	}
}

/// A short, non-reversible fingerprint of request bytes, stored in
/// [`Evidence`] instead of the raw bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
	use sha2::{Digest, Sha256};
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Race a probe's own network wait against the run's cancellation token, so
/// a worker sitting inside a single probe's read notices an interrupt
/// immediately instead of running out its full per-probe timeout. Returns
/// `None` the moment cancellation wins the race.
pub async fn cancellable<T>(cancel: &CancellationToken, fut: impl std::future::Future<Output = T>) -> Option<T> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => None,
		result = fut => Some(result),
	}
}
