//! Output writers. These only ever read a finished `Aggregator` snapshot —
//! they have no pipeline-side state of their own.

use std::io::Write;
use std::path::Path;

use proxyhawk_core::error::sanitize_for_log;
use proxyhawk_core::types::{FindingKind, ProxyResult, ProxyType, RunSummary};
use serde::Serialize;

#[derive(Serialize)]
struct JsonReport {
	total_proxies: usize,
	working_proxies: usize,
	anonymous_proxies: usize,
	cloud_proxies: usize,
	internal_access_count: usize,
	success_rate: f64,
	results: Vec<JsonResult>,
}

#[derive(Serialize)]
struct VulnerabilityDetails {
	detected_issues: Vec<String>,
	internal_targets_accessible: bool,
	malformed_requests_accepted: bool,
}

#[derive(Serialize)]
struct SecurityChecks {
	ssrf_vulnerability: bool,
	host_header_injection: bool,
	protocol_smuggling: bool,
	dns_rebinding: bool,
	internal_network_access: bool,
	cloud_metadata_access: bool,
	vulnerability_details: VulnerabilityDetails,
}

#[derive(Serialize)]
struct ProtocolSupport {
	http: bool,
	https: bool,
	socks4: bool,
	socks5: bool,
}

#[derive(Serialize)]
struct JsonResult {
	proxy: String,
	working: bool,
	speed_ns: u128,
	real_ip: Option<String>,
	proxy_ip: Option<String>,
	is_anonymous: bool,
	cloud_provider: Option<String>,
	internal_access: bool,
	metadata_access: bool,
	timestamp: u64,
	security_checks: SecurityChecks,
	protocol_support: ProtocolSupport,
}

fn to_json_result(r: &ProxyResult, run_started_unix: u64) -> JsonResult {
	let findings = &r.findings;
	let ssrf_vulnerability =
		findings.has(FindingKind::SsrfInternal) || findings.has(FindingKind::SsrfCloudMetadata) || findings.has(FindingKind::ParserDifferential);
	let internal_access = findings.has(FindingKind::SsrfInternal) || findings.has(FindingKind::ParserDifferential) || !findings.open_ports.is_empty();
	let cloud_metadata_access = findings.has(FindingKind::SsrfCloudMetadata) || r.metadata_access;
	let malformed_requests_accepted = findings.has(FindingKind::ParserDifferential) || findings.has(FindingKind::ProtocolSmuggling);
	let detected_issues = findings.flags.iter().map(|k| format!("{k:?}")).collect();

	JsonResult {
		proxy: r.candidate.display_url(),
		working: r.working,
		speed_ns: r.median_speed.as_nanos(),
		real_ip: r.real_ip.map(|ip| ip.to_string()),
		proxy_ip: r.apparent_ip.map(|ip| ip.to_string()),
		is_anonymous: r.anonymous,
		cloud_provider: r.cloud_provider.as_ref().map(|s| sanitize_for_log(s)),
		internal_access,
		metadata_access: r.metadata_access,
		timestamp: run_started_unix,
		security_checks: SecurityChecks {
			ssrf_vulnerability,
			host_header_injection: findings.has(FindingKind::HostHeaderInjection),
			protocol_smuggling: findings.has(FindingKind::ProtocolSmuggling),
			dns_rebinding: findings.has(FindingKind::DnsRebinding),
			internal_network_access: internal_access,
			cloud_metadata_access,
			vulnerability_details: VulnerabilityDetails {
				detected_issues,
				internal_targets_accessible: internal_access,
				malformed_requests_accepted,
			},
		},
		protocol_support: ProtocolSupport {
			http: r.working && r.proxy_type == ProxyType::Http,
			https: r.working && r.proxy_type == ProxyType::Https,
			socks4: r.working && r.proxy_type == ProxyType::Socks4,
			socks5: r.working && r.proxy_type == ProxyType::Socks5,
		},
	}
}

pub fn write_json(path: &Path, summary: &RunSummary, results: &[ProxyResult], run_started_unix: u64) -> anyhow::Result<()> {
	let report = JsonReport {
		total_proxies: summary.total,
		working_proxies: summary.working,
		anonymous_proxies: summary.anonymous,
		cloud_proxies: summary.cloud,
		internal_access_count: results
			.iter()
			.filter(|r| r.findings.has(FindingKind::SsrfInternal) || !r.findings.open_ports.is_empty())
			.count(),
		success_rate: summary.mean_success_rate,
		results: results.iter().map(|r| to_json_result(r, run_started_unix)).collect(),
	};
	let file = std::fs::File::create(path)?;
	serde_json::to_writer_pretty(file, &report)?;
	Ok(())
}

pub fn write_text_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
	let mut f = std::fs::File::create(path)?;
	writeln!(f, "proxyhawk run summary")?;
	writeln!(f, "total proxies checked: {}", summary.total)?;
	writeln!(f, "working:               {}", summary.working)?;
	writeln!(f, "anonymous:             {}", summary.anonymous)?;
	writeln!(f, "cloud-affiliated:      {}", summary.cloud)?;
	writeln!(f, "with security findings: {}", summary.with_findings)?;
	writeln!(f, "mean baseline success rate: {:.1}%", summary.mean_success_rate * 100.0)?;
	writeln!(f, "wall clock: {:.1}s", summary.wall_clock.as_secs_f64())?;
	Ok(())
}

pub fn write_list(path: &Path, results: &[ProxyResult]) -> anyhow::Result<()> {
	let mut f = std::fs::File::create(path)?;
	for r in results {
		writeln!(f, "{}", r.candidate.display_url())?;
	}
	Ok(())
}
