//! Transport factory. Builds a connection to a target *through* a given
//! proxy candidate, selecting the dial strategy by [`ProxyType`]. Probes need
//! to shape raw bytes on the wire (malformed Content-Length/Transfer-Encoding
//! combinations, CRLF-bearing header values), so the factory hands back a raw
//! duplex stream plus the request form the caller must use, rather than a
//! higher-level HTTP client that would refuse to emit malformed requests.

pub mod dns;
pub mod socks;

use crate::prelude::*;
use crate::types::{ProxyCandidate, ProxyType};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

pub type ProxyStream = Pin<Box<dyn AsyncReadWrite>>;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> AsyncReadWrite for T {}

/// Whether the caller should write an absolute-form request-target (plain
/// HTTP forward-proxying, no tunnel established) or an origin-form one
/// (the stream already terminates at the target, via CONNECT or SOCKS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestForm {
	Origin,
	AbsoluteViaProxy,
}

#[derive(Debug, Clone)]
pub struct AuthPolicy {
	pub auth_enabled: bool,
	pub default_username: Option<String>,
	pub default_password: Option<String>,
}

impl AuthPolicy {
	pub fn disabled() -> Self {
		Self {
			auth_enabled: false,
			default_username: None,
			default_password: None,
		}
	}
}

pub struct TransportFactory {
	pub insecure_skip_verify: bool,
	pub timeout: Duration,
}

impl TransportFactory {
	pub fn new(timeout: Duration, insecure_skip_verify: bool) -> Self {
		Self { timeout, insecure_skip_verify }
	}

	/// `Proxy-Authorization` header value, from embedded credentials first,
	/// falling back to the policy default.
	pub fn auth_header(&self, candidate: &ProxyCandidate, policy: &AuthPolicy) -> Option<String> {
		if let Some(header) = candidate.basic_auth_header() {
			return Some(header);
		}
		if policy.auth_enabled {
			if let (Some(user), Some(pass)) = (&policy.default_username, &policy.default_password) {
				use base64::Engine;
				let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
				return Some(format!("Basic {encoded}"));
			}
		}
		None
	}

	/// Connect to `target_host:target_port` through `candidate`, whose type
	/// is `proxy_type` (already detected). `target_is_tls` selects whether a
	/// CONNECT tunnel + TLS wrap is required once past the proxy hop.
	pub async fn connect(
		&self,
		candidate: &ProxyCandidate,
		proxy_type: ProxyType,
		target_host: &str,
		target_port: u16,
		target_is_tls: bool,
	) -> io::Result<(ProxyStream, RequestForm)> {
		let proxy_addr = resolve_one(&candidate.host, candidate.port).await?;

		match proxy_type {
			ProxyType::Http | ProxyType::Https => {
				if target_is_tls {
					let stream = TcpStream::connect(proxy_addr).await?;
					let stream = connect_tunnel(stream, target_host, target_port, self.timeout).await?;
					let stream = self.maybe_wrap_tls(stream, target_host, target_is_tls).await?;
					Ok((stream, RequestForm::Origin))
				} else {
					let stream = TcpStream::connect(proxy_addr).await?;
					Ok((Box::pin(stream) as ProxyStream, RequestForm::AbsoluteViaProxy))
				}
			},
			ProxyType::Socks4 => {
				let stream = socks::connect_socks4(proxy_addr, target_host, target_port, self.timeout)
					.await
					.map_err(to_io_err)?;
				let stream = self.maybe_wrap_tls(stream, target_host, target_is_tls).await?;
				Ok((stream, RequestForm::Origin))
			},
			ProxyType::Socks5 => {
				let creds = candidate
					.username
					.as_ref()
					.map(|u| (u.as_str(), candidate.password.as_deref().unwrap_or("")));
				let stream = socks::connect_socks5(proxy_addr, target_host, target_port, creds, self.timeout)
					.await
					.map_err(to_io_err)?;
				let stream = self.maybe_wrap_tls(stream, target_host, target_is_tls).await?;
				Ok((stream, RequestForm::Origin))
			},
			ProxyType::Unknown => Err(io::Error::other("proxy type undetected")),
		}
	}

	async fn maybe_wrap_tls<S>(&self, stream: S, target_host: &str, target_is_tls: bool) -> io::Result<ProxyStream>
	where
		S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
	{
		if !target_is_tls {
			return Ok(Box::pin(stream) as ProxyStream);
		}
		let connector = self.tls_connector();
		let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(target_host.to_string())
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
		let tls_stream = connector.connect(server_name, stream).await?;
		Ok(Box::pin(tls_stream) as ProxyStream)
	}

	/// TLS peer verification is skipped by default — the tool validates
	/// proxy content behavior, not certificates.
	fn tls_connector(&self) -> TlsConnector {
		let config = if self.insecure_skip_verify {
			ClientConfig::builder()
				.dangerous()
				.with_custom_certificate_verifier(Arc::new(NoVerify))
				.with_no_client_auth()
		} else {
			let mut roots = RootCertStore::empty();
			roots.extend(webpki_roots_fallback());
			ClientConfig::builder()
				.with_root_certificates(roots)
				.with_no_client_auth()
		};
		TlsConnector::from(Arc::new(config))
	}
}

fn webpki_roots_fallback() -> Vec<tokio_rustls::rustls::pki_types::CertificateDer<'static>> {
	// No native-cert crate is pulled in when verification is actually
	// enforced; callers exercising this path are expected to run with
	// `insecure_skip_verify=true`, the tool's default.
	Vec::new()
}

#[derive(Debug)]
struct NoVerify;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerify {
	fn verify_server_cert(
		&self,
		_end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
		_intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
		_server_name: &tokio_rustls::rustls::pki_types::ServerName<'_>,
		_ocsp_response: &[u8],
		_now: tokio_rustls::rustls::pki_types::UnixTime,
	) -> std::result::Result<tokio_rustls::rustls::client::danger::ServerCertVerified, tokio_rustls::rustls::Error> {
		Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		_message: &[u8],
		_cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
		_dss: &tokio_rustls::rustls::DigitallySignedStruct,
	) -> std::result::Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error>
	{
		Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn verify_tls13_signature(
		&self,
		_message: &[u8],
		_cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
		_dss: &tokio_rustls::rustls::DigitallySignedStruct,
	) -> std::result::Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error>
	{
		Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
		use tokio_rustls::rustls::SignatureScheme::*;
		vec![
			RSA_PKCS1_SHA256,
			ECDSA_NISTP256_SHA256,
			RSA_PKCS1_SHA384,
			ECDSA_NISTP384_SHA384,
			RSA_PKCS1_SHA512,
			RSA_PSS_SHA256,
			RSA_PSS_SHA384,
			RSA_PSS_SHA512,
			ED25519,
		]
	}
}

/// HTTP CONNECT handshake to `target`, used for HTTP/HTTPS-type proxies.
async fn connect_tunnel(
	mut stream: TcpStream,
	target_host: &str,
	target_port: u16,
	timeout: Duration,
) -> io::Result<TcpStream> {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	let req = format!(
		"CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n\r\n"
	);
	tokio::time::timeout(timeout, stream.write_all(req.as_bytes())).await??;

	let mut buf = Vec::with_capacity(256);
	let mut byte = [0u8; 1];
	loop {
		let n = tokio::time::timeout(timeout, stream.read(&mut byte)).await??;
		if n == 0 {
			break;
		}
		buf.push(byte[0]);
		if buf.ends_with(b"\r\n\r\n") {
			break;
		}
		if buf.len() > 8192 {
			return Err(io::Error::other("CONNECT response too large"));
		}
	}
	let head = String::from_utf8_lossy(&buf);
	let status_line = head.lines().next().unwrap_or("");
	if !status_line.contains("200") {
		return Err(io::Error::other(format!("CONNECT rejected: {status_line}")));
	}
	Ok(stream)
}

async fn resolve_one(host: &str, port: u16) -> io::Result<SocketAddr> {
	if let Ok(ip) = host.parse::<IpAddr>() {
		return Ok(SocketAddr::new(ip, port));
	}
	let mut addrs = tokio::net::lookup_host((host, port)).await?;
	addrs.next().ok_or_else(|| io::Error::other("no addresses resolved"))
}

/// Dial `host:port` directly (no proxy hop) and wrap in TLS — used by
/// components that reach an external service themselves, such as the OOB
/// correlator polling its collaborator endpoint.
pub async fn connect_tls_direct(host: &str, port: u16, timeout: Duration) -> io::Result<ProxyStream> {
	let addr = resolve_one(host, port).await?;
	let tcp = connect_direct(addr, timeout).await?;
	let factory = TransportFactory::new(timeout, true);
	factory.maybe_wrap_tls(tcp, host, true).await
}

/// Open a fresh TCP connection to `addr`, bypassing any connection-pooling —
/// used by the DNS-rebinding probe to force a distinct connect between two
/// resolutions of the same name.
pub async fn connect_direct(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
	let socket = if addr.is_ipv4() {
		tokio::net::TcpSocket::new_v4()?
	} else {
		tokio::net::TcpSocket::new_v6()?
	};
	tokio::time::timeout(timeout, socket.connect(addr)).await?
}

fn to_io_err(e: socks::SocksError) -> io::Error {
	io::Error::other(e)
}
