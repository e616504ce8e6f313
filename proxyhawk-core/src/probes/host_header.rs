//! Host header injection probe. A forward proxy that routes or authorizes by
//! the `Host:` header (or one of its de-facto forwarding aliases) instead of
//! the request-line authority can be steered past its own allowlist by
//! forging that header. Confirmed only via an out-of-band callback —
//! without a collaborator configured, the probe has no way to tell
//! "forwarded the forged host" from "ignored it", so it stays inconclusive
//! rather than guessing from response content.

use super::ProbeContext;
use crate::httpclient::RequestSpec;
use crate::prelude::*;
use crate::transport::RequestForm;
use crate::types::{Evidence, FindingKind, ProbeOutcome};

type Outcome = (ProbeOutcome, Option<(FindingKind, Evidence)>);

const ANCHOR_HOST: &str = "example.com";
const ANCHOR_PORT: u16 = 80;
const INJECTED_HEADERS: &[&str] = &["Host", "X-Forwarded-Host", "X-Real-IP", "X-Originating-IP", "Forwarded"];
const CALLBACK_WAIT: Duration = Duration::from_secs(3);

pub async fn probe(ctx: &ProbeContext<'_>) -> Outcome {
	let Some(oob) = ctx.oob else {
		return (ProbeOutcome::Inconclusive, None);
	};

	for header_name in INJECTED_HEADERS {
		if ctx.cancel.is_cancelled() {
			break;
		}
		let token = oob.mint_token().await;
		let collaborator_host = format!("{token}.oob.proxyhawk.invalid");

		let Ok((mut stream, form)) = ctx.factory.connect(ctx.candidate, ctx.proxy_type, ANCHOR_HOST, ANCHOR_PORT, false).await else {
			continue;
		};
		let target = match form {
			RequestForm::AbsoluteViaProxy => format!("http://{ANCHOR_HOST}/"),
			RequestForm::Origin => "/".to_string(),
		};
		let header_value = if *header_name == "Forwarded" { format!("host={collaborator_host}") } else { collaborator_host.clone() };
		let spec = RequestSpec::get(target, ANCHOR_HOST).header(*header_name, header_value);
		let req_bytes = spec.render(form);
		let Some(_) = super::cancellable(ctx.cancel, crate::httpclient::send(&mut stream, &spec, form, ctx.per_probe_timeout)).await else {
			break;
		};

		let interactions = super::cancellable(ctx.cancel, oob.wait_for(&token, CALLBACK_WAIT)).await.unwrap_or_default();
		if let Some(interaction) = interactions.first() {
			let evidence = Evidence {
				probe_id: strng("host_header_injection"),
				request_fingerprint: super::fingerprint(&req_bytes),
				response_fingerprint: super::fingerprint(interaction.raw_request.as_bytes()),
				oob_token_match: Some(token),
			};
			return (ProbeOutcome::Positive, Some((FindingKind::HostHeaderInjection, evidence)));
		}
	}

	(ProbeOutcome::Inconclusive, None)
}
