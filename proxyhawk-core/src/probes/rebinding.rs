//! DNS rebinding probe. An attacker who controls a short-TTL domain can
//! answer with a public IP while the proxy performs any allowlist check,
//! then rebind to an internal address before the proxy's own TCP connect.
//! We can only demonstrate the precondition, not stage a live attacker's
//! DNS flip: resolve the probe domain ourselves before and after asking the
//! proxy to fetch it, and see whether the answer actually changed while the
//! proxy still served a clean response — i.e. whether the proxy would have
//! silently followed a flip, had one happened here.

use super::ProbeContext;
use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::RequestForm;
use crate::transport::dns::Resolver;
use crate::types::{Evidence, FindingKind, ProbeOutcome};

type Outcome = (ProbeOutcome, Option<(FindingKind, Evidence)>);

const PROBE_HOST: &str = "example.com";
const PROBE_PORT: u16 = 80;
const REBIND_WINDOW: Duration = Duration::from_millis(500);

pub async fn probe(ctx: &ProbeContext<'_>) -> Outcome {
	let resolver = Resolver::system();

	let before = match resolver.resolve(PROBE_HOST).await {
		Ok(addrs) => addrs,
		Err(_) => return (ProbeOutcome::Inconclusive, None),
	};

	let Ok((mut stream, form)) = ctx.factory.connect(ctx.candidate, ctx.proxy_type, PROBE_HOST, PROBE_PORT, false).await else {
		return (ProbeOutcome::Inconclusive, None);
	};
	let target = match form {
		RequestForm::AbsoluteViaProxy => format!("http://{PROBE_HOST}/"),
		RequestForm::Origin => "/".to_string(),
	};
	let spec = RequestSpec::get(target, PROBE_HOST);
	let req_bytes = spec.render(form);
	let sent = super::cancellable(ctx.cancel, httpclient::send(&mut stream, &spec, form, ctx.per_probe_timeout)).await;
	let served_cleanly = matches!(sent, Some(Ok(r)) if r.status.is_some());
	if !served_cleanly {
		return (ProbeOutcome::Inconclusive, None);
	}

	if super::cancellable(ctx.cancel, tokio::time::sleep(REBIND_WINDOW)).await.is_none() {
		return (ProbeOutcome::Inconclusive, None);
	}

	let after = match resolver.resolve(PROBE_HOST).await {
		Ok(addrs) => addrs,
		Err(_) => return (ProbeOutcome::Inconclusive, None),
	};

	if before != after {
		let evidence = Evidence {
			probe_id: strng("dns_rebinding"),
			request_fingerprint: super::fingerprint(&req_bytes),
			response_fingerprint: format!("{before:?}->{after:?}"),
			oob_token_match: None,
		};
		return (ProbeOutcome::Positive, Some((FindingKind::DnsRebinding, evidence)));
	}

	// The answer held steady and the proxy served a normal response; no
	// rebind occurred in this window, so there's nothing to demonstrate
	// either way here.
	(ProbeOutcome::Inconclusive, None)
}
