//! Non-interactive progress writer. Drains the same event stream a terminal
//! UI would, but just prints a single overwriting line plus structured log
//! forwarding — a full TUI is out of scope here.

use std::io::Write;

use proxyhawk_core::events::{Event, EventStream, LogLevel};

pub async fn drain(mut stream: EventStream, quiet: bool) {
	while let Some(event) = stream.recv().await {
		match event {
			Event::ProgressTick { completed, total } => {
				if !quiet {
					eprint!("\r[{completed}/{total}] checking proxies...");
					let _ = std::io::stderr().flush();
				}
			},
			Event::ProxyStarted { url } => {
				tracing::debug!(url, "proxy check started");
			},
			Event::ProxyFinished { result } => {
				tracing::debug!(proxy = %result.candidate.display_url(), working = result.working, "proxy check finished");
			},
			Event::Log { level, message } => match level {
				LogLevel::Debug => tracing::debug!("{message}"),
				LogLevel::Info => tracing::info!("{message}"),
				LogLevel::Warn => tracing::warn!("{message}"),
				LogLevel::Error => tracing::error!("{message}"),
			},
		}
	}
	if !quiet {
		eprintln!();
	}
}
