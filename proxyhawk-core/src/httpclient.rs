//! A deliberately small HTTP/1.1 client that writes exactly the bytes it's
//! told to. The security probe battery needs to emit malformed requests
//! (conflicting Content-Length/Transfer-Encoding, oversize chunks, obfuscated
//! header names); a well-behaved client like hyper would refuse. Well-formed
//! requests (baseline validation, most probes) go through [`RequestSpec`] and
//! [`send`]; probes that need raw bytes call [`send_raw`] directly.

use crate::prelude::*;
use crate::transport::RequestForm;
use std::collections::BTreeMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct RequestSpec {
	pub method: String,
	/// Absolute URL when `form == AbsoluteViaProxy`, path-only otherwise.
	pub target: String,
	pub host_header: String,
	pub headers: BTreeMap<String, String>,
	pub body: Vec<u8>,
}

impl RequestSpec {
	pub fn get(target_path_or_url: impl Into<String>, host_header: impl Into<String>) -> Self {
		Self {
			method: "GET".to_string(),
			target: target_path_or_url.into(),
			host_header: host_header.into(),
			headers: BTreeMap::new(),
			body: Vec::new(),
		}
	}

	pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(key.into(), value.into());
		self
	}

	/// Render to raw HTTP/1.1 request bytes. `form` decides whether `target`
	/// is written as an absolute-URI (plain forward-proxy) or origin-form
	/// request-target.
	pub fn render(&self, form: RequestForm) -> Vec<u8> {
		let mut out = Vec::with_capacity(256 + self.body.len());
		out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", self.method, self.target).as_bytes());
		out.extend_from_slice(format!("Host: {}\r\n", self.host_header).as_bytes());
		for (k, v) in &self.headers {
			out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
		}
		if !self.body.is_empty() && !self.headers.keys().any(|k| k.eq_ignore_ascii_case("content-length")) {
			out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
		}
		out.extend_from_slice(b"Connection: close\r\n\r\n");
		out.extend_from_slice(&self.body);
		let _ = form; // absolute-vs-origin is decided by the caller setting `target`
		out
	}
}

#[derive(Debug, Clone)]
pub struct RawResponse {
	pub status: Option<u16>,
	pub headers: Vec<(String, String)>,
	pub body: Vec<u8>,
}

impl RawResponse {
	pub fn header(&self, name: &str) -> Option<&str> {
		self
			.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}
}

/// Send `spec` over `stream` and parse one HTTP response, tolerantly —
/// proxies under test routinely emit non-conformant responses, and a parse
/// failure must surface as an error, never a panic.
pub async fn send<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	spec: &RequestSpec,
	form: RequestForm,
	timeout: Duration,
) -> io::Result<RawResponse> {
	let bytes = spec.render(form);
	send_raw(stream, &bytes, timeout).await
}

/// Write arbitrary bytes and parse a response — used directly by probes that
/// construct malformed request bytes themselves (smuggling, chunked edge
/// cases).
pub async fn send_raw<S: AsyncRead + AsyncWrite + Unpin>(
	stream: &mut S,
	raw_request: &[u8],
	timeout: Duration,
) -> io::Result<RawResponse> {
	tokio::time::timeout(timeout, stream.write_all(raw_request)).await??;
	tokio::time::timeout(timeout, read_response(stream)).await?
}

/// Read one response off `stream`: status line + headers, then a body sized
/// by Content-Length (or read-to-EOF when absent, capped). `pub(crate)` so
/// probes that need to observe more than one response off a single
/// connection (request smuggling) can call it directly.
pub(crate) async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<RawResponse> {
	const MAX_HEAD: usize = 64 * 1024;
	const MAX_BODY: usize = 8 * 1024 * 1024;

	let mut buf = Vec::with_capacity(1024);
	let mut chunk = [0u8; 1024];
	let head_end = loop {
		if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
			break pos + 4;
		}
		if buf.len() > MAX_HEAD {
			return Err(io::Error::other("response headers too large"));
		}
		let n = stream.read(&mut chunk).await?;
		if n == 0 {
			if buf.is_empty() {
				return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before any response"));
			}
			break buf.len();
		}
		buf.extend_from_slice(&chunk[..n]);
	};

	let head_text = String::from_utf8_lossy(&buf[..head_end]);
	let mut lines = head_text.lines();
	let status_line = lines.next().unwrap_or("");
	let status = status_line
		.split_whitespace()
		.nth(1)
		.and_then(|s| s.parse::<u16>().ok());

	let mut headers = Vec::new();
	for line in lines {
		if let Some((k, v)) = line.split_once(':') {
			headers.push((k.trim().to_string(), v.trim().to_string()));
		}
	}

	let mut body = buf[head_end.min(buf.len())..].to_vec();
	let content_length = headers
		.iter()
		.find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
		.and_then(|(_, v)| v.trim().parse::<usize>().ok());
	let chunked = headers
		.iter()
		.any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked"));

	if let Some(len) = content_length {
		let len = len.min(MAX_BODY);
		while body.len() < len {
			let n = stream.read(&mut chunk).await?;
			if n == 0 {
				break;
			}
			body.extend_from_slice(&chunk[..n]);
		}
		body.truncate(len);
	} else if chunked {
		body = read_chunked_body(stream, body).await?;
	} else {
		// No explicit length: read until EOF or cap, whichever comes first.
		loop {
			if body.len() >= MAX_BODY {
				break;
			}
			let n = stream.read(&mut chunk).await?;
			if n == 0 {
				break;
			}
			body.extend_from_slice(&chunk[..n]);
		}
	}

	Ok(RawResponse { status, headers, body })
}

async fn read_chunked_body<S: AsyncRead + Unpin>(stream: &mut S, mut buf: Vec<u8>) -> io::Result<Vec<u8>> {
	const MAX_BODY: usize = 8 * 1024 * 1024;
	let mut chunk = [0u8; 1024];
	let mut out = Vec::new();
	loop {
		while !buf.contains(&b'\n') {
			let n = stream.read(&mut chunk).await?;
			if n == 0 {
				return Ok(out);
			}
			buf.extend_from_slice(&chunk[..n]);
		}
		let nl = buf.iter().position(|&b| b == b'\n').unwrap();
		let size_line = String::from_utf8_lossy(&buf[..nl]).trim().to_string();
		let size_str = size_line.split(';').next().unwrap_or("0").trim();
		let size = usize::from_str_radix(size_str, 16).unwrap_or(0);
		buf.drain(..=nl);
		if size == 0 {
			return Ok(out);
		}
		while buf.len() < size + 2 {
			let n = stream.read(&mut chunk).await?;
			if n == 0 {
				return Ok(out);
			}
			buf.extend_from_slice(&chunk[..n]);
		}
		out.extend_from_slice(&buf[..size]);
		if out.len() > MAX_BODY {
			return Ok(out);
		}
		buf.drain(..size + 2);
	}
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}
