//! SOCKS4 and SOCKS5 client handshakes, hand-rolled directly against the
//! wire protocols (grounded in the corpus's own raw-protocol SOCKS dialers,
//! e.g. `async-proxy`'s `clients::socks5` and arti's `socksproto`) since the
//! Transport Factory needs to forward raw TCP bytes after the handshake
//! rather than go through a higher-level SOCKS crate.

use crate::prelude::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum SocksError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("socks4 request rejected, code {0}")]
	Socks4Rejected(u8),
	#[error("socks5 handshake offered no acceptable auth method")]
	NoAcceptableAuth,
	#[error("socks5 authentication failed")]
	AuthFailed,
	#[error("socks5 connect failed, reply code {0}")]
	Socks5Rejected(u8),
	#[error("hostname too long for socks4a/socks5 (max 255 bytes)")]
	HostnameTooLong,
}

/// Connect through a SOCKS4 (or SOCKS4A, when `host` doesn't parse as an
/// IPv4 address) proxy to `target`.
pub async fn connect_socks4(
	proxy: SocketAddr,
	target_host: &str,
	target_port: u16,
	timeout: Duration,
) -> Result<TcpStream, SocksError> {
	let mut stream = tokio::time::timeout(timeout, TcpStream::connect(proxy)).await??;

	let mut req = Vec::with_capacity(32);
	req.push(0x04); // version
	req.push(0x01); // CONNECT
	req.extend_from_slice(&target_port.to_be_bytes());

	match target_host.parse::<Ipv4Addr>() {
		Ok(ip) => {
			req.extend_from_slice(&ip.octets());
			req.push(0x00); // empty userid
		},
		Err(_) => {
			if target_host.len() > 255 {
				return Err(SocksError::HostnameTooLong);
			}
			// SOCKS4A: invalid IP (0.0.0.x) signals "resolve the domain yourself"
			req.extend_from_slice(&[0, 0, 0, 1]);
			req.push(0x00); // empty userid
			req.extend_from_slice(target_host.as_bytes());
			req.push(0x00);
		},
	}

	tokio::time::timeout(timeout, stream.write_all(&req)).await??;

	let mut reply = [0u8; 8];
	tokio::time::timeout(timeout, stream.read_exact(&mut reply)).await??;
	if reply[1] != 0x5a {
		return Err(SocksError::Socks4Rejected(reply[1]));
	}
	Ok(stream)
}

/// Connect through a SOCKS5 proxy, with optional username/password
/// sub-negotiation.
pub async fn connect_socks5(
	proxy: SocketAddr,
	target_host: &str,
	target_port: u16,
	credentials: Option<(&str, &str)>,
	timeout: Duration,
) -> Result<TcpStream, SocksError> {
	let mut stream = tokio::time::timeout(timeout, TcpStream::connect(proxy)).await??;

	let methods: &[u8] = if credentials.is_some() { &[0x00, 0x02] } else { &[0x00] };
	let mut greeting = vec![0x05, methods.len() as u8];
	greeting.extend_from_slice(methods);
	tokio::time::timeout(timeout, stream.write_all(&greeting)).await??;

	let mut chosen = [0u8; 2];
	tokio::time::timeout(timeout, stream.read_exact(&mut chosen)).await??;
	if chosen[1] == 0xff {
		return Err(SocksError::NoAcceptableAuth);
	}

	if chosen[1] == 0x02 {
		let (user, pass) = credentials.ok_or(SocksError::NoAcceptableAuth)?;
		let mut auth = vec![0x01, user.len() as u8];
		auth.extend_from_slice(user.as_bytes());
		auth.push(pass.len() as u8);
		auth.extend_from_slice(pass.as_bytes());
		tokio::time::timeout(timeout, stream.write_all(&auth)).await??;

		let mut auth_reply = [0u8; 2];
		tokio::time::timeout(timeout, stream.read_exact(&mut auth_reply)).await??;
		if auth_reply[1] != 0x00 {
			return Err(SocksError::AuthFailed);
		}
	}

	let mut req = vec![0x05, 0x01, 0x00]; // version, CONNECT, reserved
	match target_host.parse::<IpAddr>() {
		Ok(IpAddr::V4(v4)) => {
			req.push(0x01);
			req.extend_from_slice(&v4.octets());
		},
		Ok(IpAddr::V6(v6)) => {
			req.push(0x04);
			req.extend_from_slice(&v6.octets());
		},
		Err(_) => {
			if target_host.len() > 255 {
				return Err(SocksError::HostnameTooLong);
			}
			req.push(0x03);
			req.push(target_host.len() as u8);
			req.extend_from_slice(target_host.as_bytes());
		},
	}
	req.extend_from_slice(&target_port.to_be_bytes());
	tokio::time::timeout(timeout, stream.write_all(&req)).await??;

	let mut head = [0u8; 4];
	tokio::time::timeout(timeout, stream.read_exact(&mut head)).await??;
	if head[1] != 0x00 {
		return Err(SocksError::Socks5Rejected(head[1]));
	}
	// Consume the bound address the server echoes back, whose length
	// depends on the address type in head[3].
	match head[3] {
		0x01 => {
			let mut rest = [0u8; 4 + 2];
			tokio::time::timeout(timeout, stream.read_exact(&mut rest)).await??;
		},
		0x03 => {
			let mut len = [0u8; 1];
			tokio::time::timeout(timeout, stream.read_exact(&mut len)).await??;
			let mut rest = vec![0u8; len[0] as usize + 2];
			tokio::time::timeout(timeout, stream.read_exact(&mut rest)).await??;
		},
		0x04 => {
			let mut rest = [0u8; 16 + 2];
			tokio::time::timeout(timeout, stream.read_exact(&mut rest)).await??;
		},
		_ => return Err(SocksError::Socks5Rejected(head[3])),
	}

	Ok(stream)
}

impl From<tokio::time::error::Elapsed> for SocksError {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		SocksError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "socks handshake timed out"))
	}
}
