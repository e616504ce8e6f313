//! A minimal WHOIS client (raw protocol on TCP port 43), hand-rolled rather
//! than reaching for a half-fit dependency.

use crate::prelude::*;
use std::io;
use std::net::IpAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const WHOIS_HOST: &str = "whois.arin.net";
const WHOIS_PORT: u16 = 43;

/// Query the ARIN whois server for `ip` and return the raw response text.
/// Regional registries (RIPE/APNIC/etc.) are reached transitively via ARIN's
/// referral line in practice; this client does not chase `ReferralServer`
/// itself, matching the classifier's need for an organization-name
/// substring match rather than an authoritative registry answer.
pub async fn lookup(ip: IpAddr, timeout: Duration) -> io::Result<String> {
	let stream = tokio::time::timeout(timeout, TcpStream::connect((WHOIS_HOST, WHOIS_PORT))).await??;
	query(stream, &format!("{ip}\r\n"), timeout).await
}

async fn query(mut stream: TcpStream, query: &str, timeout: Duration) -> io::Result<String> {
	tokio::time::timeout(timeout, stream.write_all(query.as_bytes())).await??;
	let mut out = Vec::new();
	tokio::time::timeout(timeout, stream.read_to_end(&mut out)).await??;
	Ok(String::from_utf8_lossy(&out).to_string())
}

/// Does the WHOIS response text mention any of the configured organization
/// names?
pub fn matches_org(whois_text: &str, org_names: &[String]) -> bool {
	let lower = whois_text.to_ascii_lowercase();
	org_names.iter().any(|org| lower.contains(&org.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn org_match_is_case_insensitive() {
		let text = "OrgName: Amazon Technologies Inc.\nNetRange: 3.0.0.0 - 3.255.255.255\n";
		assert!(matches_org(text, &["amazon".to_string()]));
		assert!(!matches_org(text, &["Google".to_string()]));
	}
}
