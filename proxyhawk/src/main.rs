//! CLI entry point. Parses arguments, loads configuration, validates the
//! candidate proxy list, drives the pipeline to completion, and writes
//! whichever output files were requested. The pipeline, probes, and data
//! model all live in `proxyhawk-core`; this binary is the CLI surface, plus
//! the non-interactive progress writer that stands in for a terminal UI.

mod config_io;
mod config_watch;
mod output;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use proxyhawk_core::candidate::Validator;
use proxyhawk_core::config::Config;
use proxyhawk_core::events;
use proxyhawk_core::pipeline::Pipeline;
use proxyhawk_core::types::ProxyCandidate;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_CANCELED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "proxyhawk", version, about = "Concurrent proxy validator and security auditor", long_about = None)]
struct Args {
	/// File of candidate proxies, one per line
	#[arg(short = 'l', long = "list", value_name = "file")]
	list: Option<PathBuf>,

	/// Check a single proxy instead of reading a list file
	#[arg(long = "target", value_name = "proxy")]
	target: Option<String>,

	/// YAML configuration file
	#[arg(long = "config", value_name = "path")]
	config: Option<PathBuf>,

	/// Worker pool size, overrides the config file
	#[arg(short = 'c', long = "concurrency", value_name = "int")]
	concurrency: Option<usize>,

	/// Per-request timeout in seconds, overrides the config file
	#[arg(short = 't', long = "timeout", value_name = "seconds")]
	timeout: Option<u64>,

	/// Info-level logging
	#[arg(short = 'v', long = "verbose")]
	verbose: bool,

	/// Debug-level logging (implies -v)
	#[arg(short = 'd', long = "debug")]
	debug: bool,

	/// Enable retry with exponential backoff, overrides the config file
	#[arg(short = 'r', long = "retry")]
	retry: bool,

	/// Disable the live progress line
	#[arg(long = "no-ui")]
	no_ui: bool,

	/// Write a human-readable summary to this file
	#[arg(short = 'o', long = "output", value_name = "file")]
	output: Option<PathBuf>,

	/// Write the full JSON report to this file
	#[arg(short = 'j', long = "json", value_name = "file")]
	json: Option<PathBuf>,

	/// Write working proxies, one per line, to this file
	#[arg(long = "wp", value_name = "file")]
	working_proxies: Option<PathBuf>,

	/// Write working AND anonymous proxies, one per line, to this file
	#[arg(long = "wpa", value_name = "file")]
	working_anonymous_proxies: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_logging(&args);

	let outcome = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("starting async runtime")?
		.block_on(run(args));

	match outcome {
		Ok(code) => std::process::exit(code),
		Err(e) => {
			tracing::error!(error = %e, "fatal error");
			std::process::exit(EXIT_FATAL);
		},
	}
}

fn init_logging(args: &Args) {
	let level = if args.debug {
		"debug"
	} else if args.verbose {
		"info"
	} else {
		"warn"
	};
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
}

async fn run(args: Args) -> anyhow::Result<i32> {
	let mut config = match &args.config {
		Some(path) => config_io::load(path)?,
		None => Config::default(),
	};
	apply_overrides(&mut config, &args);
	let config = Arc::new(config);

	// Kept alive for the lifetime of this run; a new snapshot only affects a
	// subsequent run, never the batch already executing.
	let _config_watch = args.config.as_ref().map(|path| config_watch::spawn(path.clone(), (*config).clone()));

	let (candidates, saw_any_candidate_line) = load_candidates(&args, config.allow_private_hosts)?;
	if candidates.is_empty() && !saw_any_candidate_line {
		// An empty file, or one containing only blank/comment lines, is a
		// fatal configuration error. A file whose lines were all rejected by
		// the validator is not: those are per-line warnings, and the run
		// completes normally with zero candidates.
		anyhow::bail!("proxy list is empty: no candidate lines found");
	}

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::warn!("interrupted, draining in-flight work");
				cancel.cancel();
			}
		});
	}

	let (publisher, stream) = events::channel();
	let progress_task = tokio::spawn(progress::drain(stream, args.no_ui));

	let pipeline = Pipeline::new(config.clone(), publisher, cancel.clone());
	pipeline.run(candidates).await;
	let _ = progress_task.await;

	let aggregator = pipeline.aggregator();
	let summary = aggregator.summarize();
	let results = aggregator.all();
	let run_started_unix = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

	if let Some(path) = &args.output {
		output::write_text_summary(path, &summary)?;
	}
	if let Some(path) = &args.json {
		output::write_json(path, &summary, &results, run_started_unix)?;
	}
	if let Some(path) = &args.working_proxies {
		output::write_list(path, &aggregator.working())?;
	}
	if let Some(path) = &args.working_anonymous_proxies {
		output::write_list(path, &aggregator.working_and_anonymous())?;
	}

	tracing::info!(total = summary.total, working = summary.working, anonymous = summary.anonymous, "run complete");

	Ok(if cancel.is_cancelled() { EXIT_CANCELED } else { EXIT_OK })
}

fn apply_overrides(config: &mut Config, args: &Args) {
	if let Some(c) = args.concurrency {
		config.concurrency = c;
	}
	if let Some(t) = args.timeout {
		config.timeout = Duration::from_secs(t);
	}
	if args.retry {
		config.retry_enabled = true;
	}
}

/// Returns the parsed candidates plus whether the input contained at least
/// one non-blank, non-comment line — used to distinguish "every line was a
/// rejected candidate" (a warning, the run proceeds with zero candidates)
/// from "the file was empty or comments-only" (fatal).
fn load_candidates(args: &Args, allow_private_hosts: bool) -> anyhow::Result<(Vec<ProxyCandidate>, bool)> {
	let validator = Validator::new(allow_private_hosts);

	if let Some(target) = &args.target {
		let candidate = validator.validate_token(target).with_context(|| format!("validating --target {target}"))?;
		return Ok((vec![candidate], true));
	}

	let Some(path) = &args.list else {
		anyhow::bail!("either -l <file> or --target <proxy> is required");
	};
	let text = std::fs::read_to_string(path).with_context(|| format!("reading proxy list {}", path.display()))?;

	let mut candidates = Vec::new();
	let mut saw_any_candidate_line = false;
	for (lineno, line) in text.lines().enumerate() {
		let token_present = line.split('#').next().unwrap_or("").split_whitespace().next().is_some();
		if token_present {
			saw_any_candidate_line = true;
		}
		match validator.validate_line(line) {
			Ok(Some(candidate)) => candidates.push(candidate),
			Ok(None) => {},
			Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping invalid proxy line"),
		}
	}
	Ok((candidates, saw_any_candidate_line))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn overrides_apply_on_top_of_defaults() {
		let mut config = Config::default();
		let args = Args {
			list: None,
			target: None,
			config: None,
			concurrency: Some(42),
			timeout: Some(5),
			verbose: false,
			debug: false,
			retry: true,
			no_ui: false,
			output: None,
			json: None,
			working_proxies: None,
			working_anonymous_proxies: None,
		};
		apply_overrides(&mut config, &args);
		assert_eq!(config.concurrency, 42);
		assert_eq!(config.timeout, Duration::from_secs(5));
		assert!(config.retry_enabled);
	}

	#[test]
	fn load_candidates_skips_bad_lines_and_keeps_good_ones() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "# a comment").unwrap();
		writeln!(file, "203.0.113.5:8080").unwrap();
		writeln!(file, "ftp://not-a-supported-scheme:1").unwrap();
		writeln!(file, "socks5://203.0.113.9:1080").unwrap();
		file.flush().unwrap();

		let args = Args {
			list: Some(file.path().to_path_buf()),
			target: None,
			config: None,
			concurrency: None,
			timeout: None,
			verbose: false,
			debug: false,
			retry: false,
			no_ui: false,
			output: None,
			json: None,
			working_proxies: None,
			working_anonymous_proxies: None,
		};
		let (candidates, saw_any_candidate_line) = load_candidates(&args, false).unwrap();
		assert_eq!(candidates.len(), 2);
		assert!(saw_any_candidate_line);
	}

	#[test]
	fn comments_only_file_reports_no_candidate_lines() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "# nothing here").unwrap();
		writeln!(file, "   ").unwrap();
		file.flush().unwrap();

		let args = Args {
			list: Some(file.path().to_path_buf()),
			target: None,
			config: None,
			concurrency: None,
			timeout: None,
			verbose: false,
			debug: false,
			retry: false,
			no_ui: false,
			output: None,
			json: None,
			working_proxies: None,
			working_anonymous_proxies: None,
		};
		let (candidates, saw_any_candidate_line) = load_candidates(&args, false).unwrap();
		assert!(candidates.is_empty());
		assert!(!saw_any_candidate_line);
	}

	#[test]
	fn all_rejected_lines_still_report_a_candidate_line_was_seen() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "127.0.0.1:9 no-proxy-here").unwrap();
		file.flush().unwrap();

		let args = Args {
			list: Some(file.path().to_path_buf()),
			target: None,
			config: None,
			concurrency: None,
			timeout: None,
			verbose: false,
			debug: false,
			retry: false,
			no_ui: false,
			output: None,
			json: None,
			working_proxies: None,
			working_anonymous_proxies: None,
		};
		let (candidates, saw_any_candidate_line) = load_candidates(&args, false).unwrap();
		assert!(candidates.is_empty());
		assert!(saw_any_candidate_line);
	}

	#[test]
	fn load_candidates_requires_list_or_target() {
		let args = Args {
			list: None,
			target: None,
			config: None,
			concurrency: None,
			timeout: None,
			verbose: false,
			debug: false,
			retry: false,
			no_ui: false,
			output: None,
			json: None,
			working_proxies: None,
			working_anonymous_proxies: None,
		};
		assert!(load_candidates(&args, false).is_err());
	}

	#[test]
	fn config_file_round_trips_through_yaml() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "concurrency: 7").unwrap();
		writeln!(file, "retry_enabled: true").unwrap();
		file.flush().unwrap();

		let config = config_io::load(file.path()).unwrap();
		assert_eq!(config.concurrency, 7);
		assert!(config.retry_enabled);
	}
}
