//! SSRF probes: does the proxy forward requests toward addresses that should
//! never leave its own trust boundary — loopback and RFC 1918/6598 ranges,
//! well-known cloud metadata endpoints, and a battery of parser-differential
//! bypasses (Orange Tsai's "A New Era of SSRF" taxonomy) for filters that
//! only match superficially?

use super::ProbeContext;
use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::RequestForm;
use crate::transport::socks::SocksError;
use crate::types::{Evidence, FindingKind, ProbeOutcome};

type Outcome = (ProbeOutcome, Option<(FindingKind, Evidence)>);

const INTERNAL_TARGETS: &[(&str, u16)] = &[("127.0.0.1", 80), ("10.0.0.1", 80), ("192.168.0.1", 80), ("172.16.0.1", 80)];

/// SSRF against plain internal/private addresses.
pub async fn probe_internal(ctx: &ProbeContext<'_>) -> Outcome {
	let mut any_negative = None;
	for (host, port) in INTERNAL_TARGETS {
		let outcome = try_reach(ctx, host, *port, host, FindingKind::SsrfInternal, "ssrf_internal").await;
		match outcome.0 {
			ProbeOutcome::Positive => return outcome,
			ProbeOutcome::Negative => {
				if any_negative.is_none() {
					any_negative = Some(outcome);
				}
			},
			ProbeOutcome::Inconclusive => {},
		}
	}
	any_negative.unwrap_or((ProbeOutcome::Inconclusive, None))
}

const GENERIC_METADATA_IP: &str = "169.254.169.254";

/// SSRF against cloud metadata endpoints, with the provider-specific header
/// each service requires.
pub async fn probe_cloud_metadata(ctx: &ProbeContext<'_>) -> Outcome {
	let mut targets: Vec<(String, Vec<(String, String)>)> = vec![
		(GENERIC_METADATA_IP.to_string(), vec![("Metadata-Flavor".to_string(), "Google".to_string())]),
		(GENERIC_METADATA_IP.to_string(), vec![("Metadata".to_string(), "true".to_string())]),
	];
	for provider in ctx.cloud_providers {
		for ip in &provider.metadata_ips {
			targets.push((ip.clone(), provider_headers(&provider.name)));
		}
	}

	let mut any_negative = None;
	for (ip, headers) in targets {
		let outcome = try_metadata(ctx, &ip, headers).await;
		match outcome.0 {
			ProbeOutcome::Positive => return outcome,
			ProbeOutcome::Negative => {
				if any_negative.is_none() {
					any_negative = Some(outcome);
				}
			},
			ProbeOutcome::Inconclusive => {},
		}
	}
	any_negative.unwrap_or((ProbeOutcome::Inconclusive, None))
}

fn provider_headers(name: &str) -> Vec<(String, String)> {
	let lower = name.to_ascii_lowercase();
	if lower.contains("azure") {
		vec![("Metadata".to_string(), "true".to_string())]
	} else if lower.contains("google") || lower.contains("gcp") {
		vec![("Metadata-Flavor".to_string(), "Google".to_string())]
	} else {
		Vec::new()
	}
}

/// Obfuscated representations of `127.0.0.1` / `169.254.169.254` that a
/// naive string-match filter misses but a standard resolver still parses
/// (Orange Tsai's SSRF bypass taxonomy).
const PARSER_DIFFERENTIAL_PAYLOADS: &[&str] = &[
	"127.1",
	"0177.0.0.1",
	"0x7f000001",
	"2130706433",
	"[::ffff:127.0.0.1]",
	"0x7f.0x0.0x0.0x1",
];

/// Re-send the internal-address probe through each obfuscated loopback
/// spelling.
pub async fn probe_parser_differential(ctx: &ProbeContext<'_>) -> Outcome {
	let mut any_negative = None;
	for payload in PARSER_DIFFERENTIAL_PAYLOADS {
		let outcome = try_reach(ctx, payload, 80, "127.0.0.1", FindingKind::ParserDifferential, "ssrf_parser_differential").await;
		match outcome.0 {
			ProbeOutcome::Positive => return outcome,
			ProbeOutcome::Negative => {
				if any_negative.is_none() {
					any_negative = Some(outcome);
				}
			},
			ProbeOutcome::Inconclusive => {},
		}
	}
	any_negative.unwrap_or((ProbeOutcome::Inconclusive, None))
}

/// Connect to `payload_host:port` through the candidate, writing `host_header`
/// as the `Host:` line (kept distinct from `payload_host` so an obfuscated
/// request-target can still carry a recognizable Host header).
async fn try_reach(ctx: &ProbeContext<'_>, payload_host: &str, port: u16, host_header: &str, kind: FindingKind, probe_id: &str) -> Outcome {
	match ctx.factory.connect(ctx.candidate, ctx.proxy_type, payload_host, port, false).await {
		Ok((mut stream, form)) => {
			let target = match form {
				RequestForm::AbsoluteViaProxy => format!("http://{payload_host}:{port}/"),
				RequestForm::Origin => "/".to_string(),
			};
			let spec = RequestSpec::get(target, host_header);
			let req_bytes = spec.render(form);
			let sent = super::cancellable(ctx.cancel, httpclient::send(&mut stream, &spec, form, ctx.per_probe_timeout)).await;
			match sent {
				Some(Ok(resp)) if resp.status.is_some() && !resp.body.is_empty() => {
					let evidence = Evidence {
						probe_id: strng(probe_id),
						request_fingerprint: super::fingerprint(&req_bytes),
						response_fingerprint: super::fingerprint(&resp.body),
						oob_token_match: None,
					};
					(ProbeOutcome::Positive, Some((kind, evidence)))
				},
				Some(Ok(_)) | Some(Err(_)) | None => (ProbeOutcome::Inconclusive, None),
			}
		},
		Err(e) => classify_connect_err(&e),
	}
}

async fn try_metadata(ctx: &ProbeContext<'_>, ip: &str, headers: Vec<(String, String)>) -> Outcome {
	match ctx.factory.connect(ctx.candidate, ctx.proxy_type, ip, 80, false).await {
		Ok((mut stream, form)) => {
			let target = match form {
				RequestForm::AbsoluteViaProxy => format!("http://{ip}/latest/meta-data/"),
				RequestForm::Origin => "/latest/meta-data/".to_string(),
			};
			let mut spec = RequestSpec::get(target, ip);
			for (k, v) in headers {
				spec = spec.header(k, v);
			}
			let req_bytes = spec.render(form);
			let sent = super::cancellable(ctx.cancel, httpclient::send(&mut stream, &spec, form, ctx.per_probe_timeout)).await;
			match sent {
				Some(Ok(resp)) if resp.status == Some(200) && !resp.body.is_empty() => {
					let evidence = Evidence {
						probe_id: strng("ssrf_cloud_metadata"),
						request_fingerprint: super::fingerprint(&req_bytes),
						response_fingerprint: super::fingerprint(&resp.body),
						oob_token_match: None,
					};
					(ProbeOutcome::Positive, Some((FindingKind::SsrfCloudMetadata, evidence)))
				},
				Some(Ok(resp)) if matches!(resp.status, Some(401) | Some(403) | Some(404)) => (ProbeOutcome::Negative, None),
				Some(Ok(_)) | Some(Err(_)) | None => (ProbeOutcome::Inconclusive, None),
			}
		},
		Err(e) => classify_connect_err(&e),
	}
}

/// A SOCKS5 "connection not allowed by ruleset" rejection is the one clean,
/// protocol-level negative this probe can recognize; everything else (refused
/// connections, timeouts, resets) is ambiguous and stays inconclusive.
fn classify_connect_err(e: &std::io::Error) -> Outcome {
	if let Some(SocksError::Socks5Rejected(0x02)) = e.get_ref().and_then(|r| r.downcast_ref::<SocksError>()) {
		return (ProbeOutcome::Negative, None);
	}
	(ProbeOutcome::Inconclusive, None)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn refusal_by_ruleset_is_a_clean_negative() {
		let err = std::io::Error::other(SocksError::Socks5Rejected(0x02));
		assert_eq!(classify_connect_err(&err).0, ProbeOutcome::Negative);
	}

	#[test]
	fn generic_io_error_is_inconclusive() {
		let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
		assert_eq!(classify_connect_err(&err).0, ProbeOutcome::Inconclusive);
	}
}
