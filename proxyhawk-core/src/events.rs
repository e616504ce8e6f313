//! Event stream. A fire-and-forget progress feed the worker pool writes into
//! and an external consumer (CLI progress writer, JSON-lines sink) drains;
//! publishing never blocks on, or waits for, a reader.

use crate::prelude::*;
use crate::types::ProxyResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
	ProgressTick { completed: usize, total: usize },
	ProxyStarted { url: String },
	ProxyFinished { result: Box<ProxyResult> },
	Log { level: LogLevel, message: String },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

/// Publish side, held by the pipeline. Cloning is cheap; every worker gets
/// its own clone.
#[derive(Clone)]
pub struct EventPublisher {
	tx: tokio::sync::mpsc::Sender<Event>,
}

/// Consume side, held by whatever writes the stream out — output writers
/// and the TUI live outside this crate, which stops at the channel.
pub struct EventStream {
	rx: tokio::sync::mpsc::Receiver<Event>,
}

/// Bounded so a stalled consumer applies backpressure rather than growing
/// memory without bound, but large enough that ordinary bursts never block
/// a worker mid-probe.
const CHANNEL_CAPACITY: usize = 1024;

pub fn channel() -> (EventPublisher, EventStream) {
	let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
	(EventPublisher { tx }, EventStream { rx })
}

impl EventPublisher {
	/// Fire-and-forget: a full channel (stalled consumer) drops the event
	/// rather than stalling the worker that produced it.
	pub fn publish(&self, event: Event) {
		if self.tx.try_send(event).is_err() {
			warn!("event stream full or closed, dropping event");
		}
	}

	pub fn progress(&self, completed: usize, total: usize) {
		self.publish(Event::ProgressTick { completed, total });
	}

	pub fn proxy_started(&self, url: impl Into<String>) {
		self.publish(Event::ProxyStarted { url: url.into() });
	}

	pub fn proxy_finished(&self, result: ProxyResult) {
		self.publish(Event::ProxyFinished { result: Box::new(result) });
	}

	pub fn log(&self, level: LogLevel, message: impl Into<String>) {
		self.publish(Event::Log { level, message: message.into() });
	}
}

impl EventStream {
	pub async fn recv(&mut self) -> Option<Event> {
		self.rx.recv().await
	}
}
