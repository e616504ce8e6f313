//! Open-localhost enumeration probe: which ports on the proxy's own loopback
//! interface will it relay a connection to? Distinct from the general
//! internal-SSRF probe in that it enumerates a whole port list and reports
//! every port that answered, not just a single yes/no.

use super::ProbeContext;
use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::RequestForm;
use crate::transport::socks::SocksError;
use crate::types::ProbeOutcome;

const LOCALHOST: &str = "127.0.0.1";
const CANDIDATE_PORTS: &[u16] = &[22, 80, 443, 3306, 5432, 6379, 8080, 8443, 9200, 27017];

/// Returns the probe's overall outcome plus every port that accepted a
/// relayed connection.
///
/// For HTTP/HTTPS-type candidates `TransportFactory::connect` only opens a
/// connection to the proxy itself — the actual target is folded into the
/// HTTP request that goes out over that connection, so a bare `connect()`
/// success says nothing about whether the *target* port is reachable. A port
/// only counts as open once a request aimed at it gets an actual HTTP
/// response back.
pub async fn probe(ctx: &ProbeContext<'_>) -> (ProbeOutcome, Vec<u16>) {
	let mut open_ports = Vec::new();
	let mut saw_clean_refusal = false;

	for &port in CANDIDATE_PORTS {
		if ctx.cancel.is_cancelled() {
			break;
		}
		match try_port(ctx, port).await {
			PortOutcome::Open => open_ports.push(port),
			PortOutcome::Refused => saw_clean_refusal = true,
			PortOutcome::Inconclusive => {},
		}
	}

	if !open_ports.is_empty() {
		(ProbeOutcome::Positive, open_ports)
	} else if saw_clean_refusal {
		(ProbeOutcome::Negative, open_ports)
	} else {
		(ProbeOutcome::Inconclusive, open_ports)
	}
}

enum PortOutcome {
	Open,
	Refused,
	Inconclusive,
}

async fn try_port(ctx: &ProbeContext<'_>, port: u16) -> PortOutcome {
	match ctx.factory.connect(ctx.candidate, ctx.proxy_type, LOCALHOST, port, false).await {
		Ok((mut stream, form)) => {
			let target = match form {
				RequestForm::AbsoluteViaProxy => format!("http://{LOCALHOST}:{port}/"),
				RequestForm::Origin => "/".to_string(),
			};
			let spec = RequestSpec::get(target, LOCALHOST);
			match super::cancellable(ctx.cancel, httpclient::send(&mut stream, &spec, form, ctx.per_probe_timeout)).await {
				Some(Ok(resp)) if resp.status.is_some() => PortOutcome::Open,
				Some(Ok(_)) => PortOutcome::Inconclusive,
				Some(Err(e)) if is_clean_refusal(&e) => PortOutcome::Refused,
				Some(Err(_)) | None => PortOutcome::Inconclusive,
			}
		},
		Err(e) if is_clean_refusal(&e) => PortOutcome::Refused,
		Err(_) => PortOutcome::Inconclusive,
	}
}

fn is_clean_refusal(e: &std::io::Error) -> bool {
	if e.kind() == std::io::ErrorKind::ConnectionRefused {
		return true;
	}
	matches!(e.get_ref().and_then(|r| r.downcast_ref::<SocksError>()), Some(SocksError::Socks5Rejected(0x05)))
}
