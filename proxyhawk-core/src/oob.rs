//! Out-of-band callback correlator. Mints opaque correlation tokens embedded
//! in probe payloads (SSRF targets, injected headers) and polls an external
//! interactsh-style collaborator service for interactions referencing them.
//!
//! Reached only through a command channel: no global singleton, no
//! goroutine-leaking polling loop. Every clone of [`OobClient`] shares one
//! background task; the task exits once the last handle drops the channel,
//! after a bounded drain of in-flight replies.

use crate::httpclient::{self, RequestSpec};
use crate::prelude::*;
use crate::transport::{self, RequestForm};
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Interaction {
	pub protocol: String,
	pub remote_addr: String,
	#[serde(default)]
	pub raw_request: String,
}

enum Command {
	Mint(oneshot::Sender<String>),
	Poll { token: String, reply: oneshot::Sender<Vec<Interaction>> },
}

/// Handle to the background correlator task. Cheaply cloneable.
#[derive(Clone)]
pub struct OobClient {
	tx: Option<mpsc::Sender<Command>>,
}

impl OobClient {
	/// Spawn the background poller against `base_url`. OOB correlation is
	/// optional: when no collaborator is configured, the returned client
	/// still mints tokens (for payload construction) but `poll` always
	/// returns empty.
	pub fn spawn(base_url: Option<String>, auth_token: Option<String>, cancel: tokio_util::sync::CancellationToken) -> Self {
		let Some(base_url) = base_url else {
			return Self::disabled();
		};
		let (tx, rx) = mpsc::channel(64);
		tokio::spawn(run(base_url, auth_token, rx, cancel));
		Self { tx: Some(tx) }
	}

	pub fn disabled() -> Self {
		Self { tx: None }
	}

	/// Mint a fresh opaque correlation token to embed in a probe payload.
	pub async fn mint_token(&self) -> String {
		let Some(tx) = &self.tx else {
			return random_token();
		};
		let (reply_tx, reply_rx) = oneshot::channel();
		if tx.send(Command::Mint(reply_tx)).await.is_err() {
			return random_token();
		}
		reply_rx.await.unwrap_or_else(|_| random_token())
	}

	/// Interactions observed so far referencing `token`.
	pub async fn poll(&self, token: &str) -> Vec<Interaction> {
		let Some(tx) = &self.tx else {
			return Vec::new();
		};
		let (reply_tx, reply_rx) = oneshot::channel();
		if tx.send(Command::Poll { token: token.to_string(), reply: reply_tx }).await.is_err() {
			return Vec::new();
		}
		reply_rx.await.unwrap_or_default()
	}

	/// Poll up to `deadline`, returning as soon as any interaction for
	/// `token` arrives.
	pub async fn wait_for(&self, token: &str, deadline: Duration) -> Vec<Interaction> {
		let start = tokio::time::Instant::now();
		loop {
			let found = self.poll(token).await;
			if !found.is_empty() || start.elapsed() >= deadline {
				return found;
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}
}

fn random_token() -> String {
	let mut bytes = [0u8; 10];
	rand::rng().fill_bytes(&mut bytes);
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn run(base_url: String, auth_token: Option<String>, mut rx: mpsc::Receiver<Command>, cancel: tokio_util::sync::CancellationToken) {
	let mut interactions: HashMap<String, Vec<Interaction>> = HashMap::new();
	let mut ticker = tokio::time::interval(POLL_INTERVAL);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				if let Ok(fresh) = fetch(&base_url, auth_token.as_deref()).await {
					for (token, mut list) in fresh {
						interactions.entry(token).or_default().append(&mut list);
					}
				}
			}
			cmd = rx.recv() => {
				match cmd {
					Some(Command::Mint(reply)) => {
						let _ = reply.send(random_token());
					},
					Some(Command::Poll { token, reply }) => {
						let found = interactions.get(&token).cloned().unwrap_or_default();
						let _ = reply.send(found);
					},
					None => break,
				}
			}
			_ = cancel.cancelled() => break,
		}
	}

	// Bounded drain: answer whatever in-flight requests remain, briefly,
	// instead of dropping them on the floor.
	let _ = tokio::time::timeout(SHUTDOWN_DRAIN, async {
		while let Some(cmd) = rx.recv().await {
			if let Command::Poll { token, reply } = cmd {
				let found = interactions.get(&token).cloned().unwrap_or_default();
				let _ = reply.send(found);
			}
		}
	})
	.await;
}

/// One polling round against the collaborator's `/poll` endpoint, keyed by
/// token in the response since the service reports interactions across all
/// minted tokens at once.
async fn fetch(base_url: &str, auth_token: Option<&str>) -> std::io::Result<HashMap<String, Vec<Interaction>>> {
	let url = url::Url::parse(base_url).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
	let host = url.host_str().ok_or_else(|| std::io::Error::other("collaborator URL has no host"))?;
	let port = url.port_or_known_default().unwrap_or(443);
	let path = if url.path().is_empty() { "/poll".to_string() } else { format!("{}/poll", url.path().trim_end_matches('/')) };

	let mut stream = transport::connect_tls_direct(host, port, Duration::from_secs(10)).await?;
	let mut spec = RequestSpec::get(path, host);
	if let Some(token) = auth_token {
		spec = spec.header("Authorization", format!("Bearer {token}"));
	}
	let resp = httpclient::send(&mut stream, &spec, RequestForm::Origin, Duration::from_secs(10)).await?;
	if resp.status != Some(200) {
		return Ok(HashMap::new());
	}
	let parsed: Vec<PolledInteraction> = serde_json::from_slice(&resp.body).unwrap_or_default();
	let mut out: HashMap<String, Vec<Interaction>> = HashMap::new();
	for item in parsed {
		out.entry(item.token).or_default().push(item.interaction);
	}
	Ok(out)
}

#[derive(serde::Deserialize)]
struct PolledInteraction {
	token: String,
	#[serde(flatten)]
	interaction: Interaction,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn disabled_client_mints_locally_and_never_finds_interactions() {
		let client = OobClient::disabled();
		let token = client.mint_token().await;
		assert_eq!(token.len(), 20);
		assert!(client.poll(&token).await.is_empty());
	}
}
