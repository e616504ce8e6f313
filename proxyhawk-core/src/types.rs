//! Data model: candidates, probe results, and the per-candidate state that
//! flows from the worker pool to the aggregator.

use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
	Http,
	Https,
	Socks4,
	Socks5,
}

impl Scheme {
	pub fn as_str(self) -> &'static str {
		match self {
			Scheme::Http => "http",
			Scheme::Https => "https",
			Scheme::Socks4 => "socks4",
			Scheme::Socks5 => "socks5",
		}
	}
}

impl std::str::FromStr for Scheme {
	type Err = ();

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"http" => Ok(Scheme::Http),
			"https" => Ok(Scheme::Https),
			"socks4" | "socks4a" => Ok(Scheme::Socks4),
			"socks5" | "socks" => Ok(Scheme::Socks5),
			_ => Err(()),
		}
	}
}

/// A candidate proxy string after the validator has accepted it. Immutable
/// once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyCandidate {
	pub scheme: Scheme,
	pub host: Strng,
	pub port: u16,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<Strng>,
	#[serde(skip_serializing_if = "Option::is_none")]
	#[serde(serialize_with = "crate::types::redact_password")]
	pub password: Option<Strng>,
}

fn redact_password<S: serde::Serializer>(
	pw: &Option<Strng>,
	s: S,
) -> std::result::Result<S::Ok, S::Error> {
	match pw {
		Some(_) => s.serialize_some("***"),
		None => s.serialize_none(),
	}
}

impl ProxyCandidate {
	/// `scheme://host:port`, never including credentials — used for
	/// display, logging, and as a dedup/rate-limit key.
	pub fn display_url(&self) -> String {
		format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
	}

	pub fn basic_auth_header(&self) -> Option<String> {
		let user = self.username.as_ref()?;
		let pass = self.password.clone().unwrap_or_default();
		use base64::Engine;
		let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
		Some(format!("Basic {encoded}"))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
	Http,
	Https,
	Socks4,
	Socks5,
	Unknown,
}

impl Default for ProxyType {
	fn default() -> Self {
		ProxyType::Unknown
	}
}

/// Per-URL result, produced by the response validator for baseline checks
/// and by each security probe for its own request.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
	pub target_url: Strng,
	pub success: bool,
	pub duration: Duration,
	pub status: Option<u16>,
	pub body_size: usize,
	pub error: Option<String>,
}

impl ProbeResult {
	pub fn ok(target_url: impl AsRef<str>, duration: Duration, status: u16, body_size: usize) -> Self {
		Self {
			target_url: strng(target_url),
			success: true,
			duration,
			status: Some(status),
			body_size,
			error: None,
		}
	}

	pub fn err(target_url: impl AsRef<str>, duration: Duration, error: impl Into<String>) -> Self {
		Self {
			target_url: strng(target_url),
			success: false,
			duration,
			status: None,
			body_size: 0,
			error: Some(error.into()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
	SsrfInternal,
	SsrfCloudMetadata,
	HostHeaderInjection,
	ProtocolSmuggling,
	DnsRebinding,
	ParserDifferential,
	OpenLocalhost,
}

/// A single evidence record for a positive finding.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
	pub probe_id: Strng,
	pub request_fingerprint: String,
	pub response_fingerprint: String,
	pub oob_token_match: Option<String>,
}

/// Outcome of one probe: a clean negative (vulnerability demonstrably
/// absent), a positive (flag + evidence), or inconclusive (probe errored,
/// timed out, or was canceled, and must not be treated as a negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
	Positive,
	Negative,
	Inconclusive,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityFindings {
	pub flags: BTreeSet<FindingKind>,
	pub evidence: Vec<Evidence>,
	pub open_ports: Vec<u16>,
	pub inconclusive: Vec<Strng>,
}

impl SecurityFindings {
	pub fn record(&mut self, outcome: ProbeOutcome, kind: FindingKind, probe_id: &str, evidence: Option<Evidence>) {
		match outcome {
			ProbeOutcome::Positive => {
				self.flags.insert(kind);
				if let Some(ev) = evidence {
					self.evidence.push(ev);
				}
			},
			ProbeOutcome::Negative => {
				// An explicit negative never unsets a flag another probe set;
				// it simply does not set one.
			},
			ProbeOutcome::Inconclusive => {
				self.inconclusive.push(strng(probe_id));
			},
		}
	}

	pub fn has(&self, kind: FindingKind) -> bool {
		self.flags.contains(&kind)
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}
}

/// State machine per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateState {
	Loaded,
	Validated,
	Dialing,
	Typed,
	BaselineTested,
	Probing,
	Sealed,
}

/// One per candidate. Built incrementally by a single worker; sealed (no
/// further mutation) when the aggregator receives it.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyResult {
	pub candidate: ProxyCandidate,
	pub proxy_type: ProxyType,
	pub working: bool,
	pub median_speed: Duration,
	pub real_ip: Option<IpAddr>,
	pub apparent_ip: Option<IpAddr>,
	pub anonymous: bool,
	pub elite: bool,
	pub cloud_provider: Option<Strng>,
	pub metadata_access: bool,
	pub findings: SecurityFindings,
	pub probe_results: Vec<ProbeResult>,
	pub debug_trace: Vec<String>,
	pub canceled: bool,
	pub state: CandidateState,
}

impl ProxyResult {
	pub fn loaded(candidate: ProxyCandidate) -> Self {
		Self {
			candidate,
			proxy_type: ProxyType::Unknown,
			working: false,
			median_speed: Duration::ZERO,
			real_ip: None,
			apparent_ip: None,
			anonymous: false,
			elite: false,
			cloud_provider: None,
			metadata_access: false,
			findings: SecurityFindings::default(),
			probe_results: Vec::new(),
			debug_trace: Vec::new(),
			canceled: false,
			state: CandidateState::Loaded,
		}
	}

	pub fn trace(&mut self, msg: impl Into<String>) {
		self.debug_trace.push(msg.into());
	}

	/// Seal the result: no further component may mutate it after this call.
	pub fn seal(mut self) -> Self {
		self.state = CandidateState::Sealed;
		self
	}
}

/// Aggregated counts, computed once from the sealed ProxyResults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
	pub total: usize,
	pub working: usize,
	pub anonymous: usize,
	pub cloud: usize,
	pub with_findings: usize,
	pub mean_success_rate: f64,
	pub wall_clock: Duration,
}
