//! End-to-end pipeline test against one working HTTP proxy. Exercises the
//! worker pool, detector, response validator, and probe battery against a
//! real TCP/HTTP round trip rather than a mocked transport — `wiremock`
//! stands in for the origin server, and a small allowlist forward proxy
//! built for this test stands in for the proxy under test.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use proxyhawk_core::candidate::Validator;
use proxyhawk_core::config::Config;
use proxyhawk_core::events;
use proxyhawk_core::pipeline::Pipeline;
use proxyhawk_core::types::ProxyType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The detector's fixed probe host: a real proxy would reach this over the
/// public internet, but an isolated test double neither has nor needs that
/// network egress — it answers locally instead.
const DETECTOR_PROBE_HOST: &str = "example.com";

/// Relays absolute-form HTTP requests whose target is `allowed`; answers the
/// detector's fixed probe host with a canned local response so detection
/// doesn't require real internet egress; anything else is dropped without a
/// response, the clean network-level failure the probe battery reads as
/// inconclusive rather than a false positive.
async fn spawn_allowlist_proxy(allowed: SocketAddr) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		loop {
			let Ok((client, _)) = listener.accept().await else { break };
			tokio::spawn(serve_one(client, allowed));
		}
	});
	addr
}

async fn serve_one(mut client: TcpStream, allowed: SocketAddr) {
	let mut buf = Vec::with_capacity(1024);
	let mut chunk = [0u8; 1024];
	let head_end = loop {
		if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
			break pos + 4;
		}
		match client.read(&mut chunk).await {
			Ok(0) | Err(_) => return,
			Ok(n) => buf.extend_from_slice(&chunk[..n]),
		}
	};

	let head = String::from_utf8_lossy(&buf[..head_end]);
	let request_line = head.lines().next().unwrap_or("");
	let target = request_line.split_whitespace().nth(1).unwrap_or("");
	let Some(parsed) = url::Url::parse(target).ok() else { return };
	let Some(host) = parsed.host_str() else { return };

	if host == DETECTOR_PROBE_HOST {
		let body = "canned stand-in for the real example.com";
		let resp = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}", body.len());
		let _ = client.write_all(resp.as_bytes()).await;
		return;
	}

	let target_addr = parsed
		.port_or_known_default()
		.and_then(|port| host.parse::<std::net::IpAddr>().ok().map(|ip| SocketAddr::new(ip, port)));
	let Some(target_addr) = target_addr else { return };
	if target_addr != allowed {
		return;
	}

	let Ok(mut upstream) = TcpStream::connect(target_addr).await else { return };
	if upstream.write_all(&buf[..head_end]).await.is_err() {
		return;
	}
	let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

#[tokio::test]
async fn working_http_proxy_is_detected_with_no_false_positive_findings() {
	let origin = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/get"))
		.respond_with(ResponseTemplate::new(200).set_body_string("hello from the origin, long enough to clear the minimum"))
		.mount(&origin)
		.await;

	let proxy_addr = spawn_allowlist_proxy(*origin.address()).await;

	let candidate = Validator::new(true).validate_token(&proxy_addr.to_string()).unwrap();

	let mut config = Config::default();
	config.concurrency = 1;
	// Kept short: every probe target this double doesn't recognize is
	// dropped silently rather than answered, so each one burns a full
	// per-probe timeout waiting for a response that never comes.
	config.timeout = Duration::from_millis(200);
	config.test_urls.default_url = format!("{}/get", origin.uri());
	config.validation.min_response_bytes = 10;

	let cancel = CancellationToken::new();
	let (publisher, mut stream) = events::channel();
	let drain = tokio::spawn(async move { while stream.recv().await.is_some() {} });

	let pipeline = Pipeline::new(Arc::new(config), publisher, cancel.clone());
	pipeline.run(vec![candidate]).await;
	drain.abort();

	let results = pipeline.aggregator().all();
	assert_eq!(results.len(), 1);
	let result = &results[0];
	assert!(result.working, "proxy should be detected as working: {result:?}");
	assert_eq!(result.proxy_type, ProxyType::Http);
	assert!(result.median_speed > Duration::ZERO);
	assert!(result.findings.flags.is_empty(), "unexpected findings: {:?}", result.findings.flags);
}
