//! Proxy-type detector: figures out which of HTTP, HTTPS-via-CONNECT,
//! SOCKS5 or SOCKS4 a candidate actually speaks.

use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::{RequestForm, socks};
use crate::types::{ProxyCandidate, ProxyType};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// A well-known, innocuous host used purely to observe whether the proxy
/// forwards traffic at all.
const PROBE_HOST: &str = "example.com";
const PROBE_PORT: u16 = 443;

pub struct Detector {
	pub overall_timeout: Duration,
}

impl Detector {
	pub fn new(overall_timeout: Duration) -> Self {
		Self { overall_timeout }
	}

	fn step_timeout(&self) -> Duration {
		self.overall_timeout / 2
	}

	/// Run the four detection probes in order; the first success wins.
	/// Returns `Unknown` if every probe fails.
	pub async fn detect(&self, candidate: &ProxyCandidate) -> ProxyType {
		if self.try_http_get(candidate).await {
			return ProxyType::Http;
		}
		if self.try_http_connect(candidate).await {
			return ProxyType::Https;
		}
		if self.try_socks5(candidate).await {
			return ProxyType::Socks5;
		}
		if self.try_socks4(candidate).await {
			return ProxyType::Socks4;
		}
		ProxyType::Unknown
	}

	/// Step 1: a plain GET through an HTTP-proxy transport targeting
	/// `host:port`, absolute-form request.
	async fn try_http_get(&self, candidate: &ProxyCandidate) -> bool {
		let Ok(addr) = resolve(candidate).await else {
			return false;
		};
		let Ok(mut stream) = self.dial(addr).await else {
			return false;
		};
		let spec = RequestSpec::get(format!("http://{PROBE_HOST}/"), PROBE_HOST);
		httpclient::send(&mut stream, &spec, RequestForm::AbsoluteViaProxy, self.step_timeout())
			.await
			.map(|r| r.status.is_some())
			.unwrap_or(false)
	}

	/// Step 2: raw CONNECT to a known host:443, looking for `200`.
	async fn try_http_connect(&self, candidate: &ProxyCandidate) -> bool {
		let Ok(addr) = resolve(candidate).await else {
			return false;
		};
		let Ok(mut stream) = self.dial(addr).await else {
			return false;
		};
		self.send_connect(&mut stream).await
	}

	async fn dial(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
		tokio::time::timeout(self.step_timeout(), TcpStream::connect(addr))
			.await
			.map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))?
	}

	async fn send_connect(&self, stream: &mut TcpStream) -> bool {
		use tokio::io::{AsyncReadExt, AsyncWriteExt};
		let req = format!("CONNECT {PROBE_HOST}:{PROBE_PORT} HTTP/1.1\r\nHost: {PROBE_HOST}:{PROBE_PORT}\r\n\r\n");
		if tokio::time::timeout(self.step_timeout(), stream.write_all(req.as_bytes()))
			.await
			.is_err()
		{
			return false;
		}
		let mut buf = [0u8; 64];
		match tokio::time::timeout(self.step_timeout(), stream.read(&mut buf)).await {
			Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).contains("HTTP/1.1 200"),
			_ => false,
		}
	}

	async fn try_socks5(&self, candidate: &ProxyCandidate) -> bool {
		let Ok(addr) = resolve(candidate).await else {
			return false;
		};
		let creds = candidate
			.username
			.as_ref()
			.map(|u| (u.as_str(), candidate.password.as_deref().unwrap_or("")));
		socks::connect_socks5(addr, PROBE_HOST, PROBE_PORT, creds, self.step_timeout())
			.await
			.is_ok()
	}

	async fn try_socks4(&self, candidate: &ProxyCandidate) -> bool {
		let Ok(addr) = resolve(candidate).await else {
			return false;
		};
		socks::connect_socks4(addr, PROBE_HOST, PROBE_PORT, self.step_timeout())
			.await
			.is_ok()
	}
}

async fn resolve(candidate: &ProxyCandidate) -> std::io::Result<SocketAddr> {
	if let Ok(ip) = candidate.host.parse::<std::net::IpAddr>() {
		return Ok(SocketAddr::new(ip, candidate.port));
	}
	let mut addrs = tokio::net::lookup_host((candidate.host.as_str(), candidate.port)).await?;
	addrs
		.next()
		.ok_or_else(|| std::io::Error::other("no addresses resolved"))
}

