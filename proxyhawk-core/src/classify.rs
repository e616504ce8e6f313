//! Anonymity and cloud classifier: is the proxy transparent about the
//! caller's real IP, and does it sit inside a cloud provider's network.

use crate::config::CloudProvider;
use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::{RequestForm, TransportFactory};
use crate::types::{ProxyCandidate, ProxyType};
use crate::whois;
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP-echo service queried once, directly, to learn the tool's own exit
/// IP. Cached for the lifetime of the run.
const IP_ECHO_HOST: &str = "api.ipify.org";
const IP_ECHO_PORT: u16 = 80;

pub struct Classifier<'a> {
	pub factory: &'a TransportFactory,
	pub cloud_providers: &'a [CloudProvider],
	real_ip: once_cell::sync::OnceCell<Option<IpAddr>>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
	pub apparent_ip: Option<IpAddr>,
	pub anonymous: bool,
	pub elite: bool,
	pub cloud_provider: Option<String>,
	pub metadata_access: bool,
}

impl<'a> Classifier<'a> {
	pub fn new(factory: &'a TransportFactory, cloud_providers: &'a [CloudProvider]) -> Self {
		Self {
			factory,
			cloud_providers,
			real_ip: once_cell::sync::OnceCell::new(),
		}
	}

	/// The tool's own exit IP, fetched once per run and cached.
	pub async fn real_ip(&self) -> Option<IpAddr> {
		if let Some(cached) = self.real_ip.get() {
			return *cached;
		}
		let ip = fetch_ip_direct().await;
		let _ = self.real_ip.set(ip);
		ip
	}

	pub async fn classify(&self, candidate: &ProxyCandidate, proxy_type: ProxyType) -> ClassificationOutcome {
		let real_ip = self.real_ip().await;
		let apparent_ip = self.fetch_ip_via_proxy(candidate, proxy_type).await;

		let anonymous = match (real_ip, apparent_ip) {
			(Some(r), Some(a)) => r != a,
			_ => false,
		};

		let tag_ip = apparent_ip.or_else(|| candidate.host.parse().ok());
		let cloud_provider = match tag_ip {
			Some(ip) => self.cloud_tag(ip).await,
			None => None,
		};

		let metadata_access = if let Some(provider) = cloud_provider
			.as_ref()
			.and_then(|name| self.cloud_providers.iter().find(|p| &p.name == name))
		{
			self.probe_metadata(candidate, proxy_type, provider).await
		} else {
			false
		};

		ClassificationOutcome {
			apparent_ip,
			anonymous,
			// Elite is provisionally equal to anonymous; the pipeline downgrades
			// it after the host-header probe runs, if the proxy leaks forwarding
			// headers to the origin.
			elite: anonymous,
			cloud_provider,
			metadata_access,
		}
	}

	async fn fetch_ip_via_proxy(&self, candidate: &ProxyCandidate, proxy_type: ProxyType) -> Option<IpAddr> {
		let (mut stream, form) = self
			.factory
			.connect(candidate, proxy_type, IP_ECHO_HOST, IP_ECHO_PORT, false)
			.await
			.ok()?;
		let target = match form {
			RequestForm::AbsoluteViaProxy => format!("http://{IP_ECHO_HOST}/"),
			RequestForm::Origin => "/".to_string(),
		};
		let spec = RequestSpec::get(target, IP_ECHO_HOST);
		let resp = httpclient::send(&mut stream, &spec, form, self.factory.timeout).await.ok()?;
		String::from_utf8_lossy(&resp.body).trim().parse().ok()
	}

	/// CIDR-membership against each provider's `internal_ranges`, falling
	/// back to a WHOIS organization-name match.
	async fn cloud_tag(&self, ip: IpAddr) -> Option<String> {
		for provider in self.cloud_providers {
			for range in &provider.internal_ranges {
				if let Ok(net) = IpNet::from_str(range) {
					if net.contains(&ip) {
						return Some(provider.name.clone());
					}
				}
			}
		}
		if let Ok(text) = whois::lookup(ip, Duration::from_secs(5)).await {
			for provider in self.cloud_providers {
				if whois::matches_org(&text, &provider.org_names) {
					return Some(provider.name.clone());
				}
			}
		}
		None
	}

	/// Probe the provider's metadata endpoint(s) through the proxy with its
	/// distinctive header.
	async fn probe_metadata(&self, candidate: &ProxyCandidate, proxy_type: ProxyType, provider: &CloudProvider) -> bool {
		for ip in &provider.metadata_ips {
			let Ok((mut stream, form)) = self.factory.connect(candidate, proxy_type, ip, 80, false).await else {
				continue;
			};
			let target = match form {
				RequestForm::AbsoluteViaProxy => format!("http://{ip}/latest/meta-data/"),
				RequestForm::Origin => "/latest/meta-data/".to_string(),
			};
			let spec = metadata_request(target, ip, &provider.name);
			if let Ok(resp) = httpclient::send(&mut stream, &spec, form, self.factory.timeout).await {
				if resp.status == Some(200) {
					return true;
				}
			}
		}
		false
	}
}

fn metadata_request(target: String, host: &str, provider_name: &str) -> RequestSpec {
	let mut spec = RequestSpec::get(target, host);
	// Distinct per-provider header the real metadata service requires.
	spec = match provider_name.to_ascii_lowercase().as_str() {
		name if name.contains("azure") => spec.header("Metadata", "true"),
		name if name.contains("google") || name.contains("gcp") => spec.header("Metadata-Flavor", "Google"),
		_ => spec,
	};
	spec
}

async fn fetch_ip_direct() -> Option<IpAddr> {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	let mut stream = tokio::net::TcpStream::connect((IP_ECHO_HOST, IP_ECHO_PORT)).await.ok()?;
	let req = format!("GET / HTTP/1.1\r\nHost: {IP_ECHO_HOST}\r\nConnection: close\r\n\r\n");
	stream.write_all(req.as_bytes()).await.ok()?;
	let mut buf = Vec::new();
	stream.read_to_end(&mut buf).await.ok()?;
	let text = String::from_utf8_lossy(&buf);
	let body = text.split("\r\n\r\n").nth(1)?;
	body.trim().parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cidr_membership() {
		let net: IpNet = "169.254.0.0/16".parse().unwrap();
		assert!(net.contains(&"169.254.169.254".parse::<IpAddr>().unwrap()));
		assert!(!net.contains(&"8.8.8.8".parse::<IpAddr>().unwrap()));
	}
}
