//! Error taxonomy. One enum per category, each carrying enough context for
//! a structured log line without re-deriving it at the call site.

use crate::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
	Config,
	FileIo,
	Validation,
	Network,
	Timeout,
	Http,
	Proxy,
	SecurityProbe,
	System,
}

/// A single taxonomized failure. `retryable` and `critical` are decided once,
/// at construction, so callers never have to re-classify a `source` error.
#[derive(Debug, Error)]
#[error("{category:?} error during {operation}: {message}")]
pub struct ProxyHawkError {
	pub category: ErrorCategory,
	pub retryable: bool,
	pub critical: bool,
	pub operation: Strng,
	/// The offending input, already sanitized (no credentials, length-capped).
	pub input: Strng,
	pub message: String,
	#[source]
	pub source: Option<anyhow::Error>,
}

impl ProxyHawkError {
	pub fn new(category: ErrorCategory, operation: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self {
			category,
			retryable: false,
			critical: false,
			operation: strng(operation),
			input: Strng::new(),
			message: message.into(),
			source: None,
		}
	}

	pub fn with_input(mut self, input: impl AsRef<str>) -> Self {
		self.input = strng(sanitize_for_log(input.as_ref()));
		self
	}

	pub fn retryable(mut self, retryable: bool) -> Self {
		self.retryable = retryable;
		self
	}

	pub fn critical(mut self, critical: bool) -> Self {
		self.critical = critical;
		self
	}

	pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
		self.source = Some(source.into());
		self
	}

	pub fn validation(operation: impl AsRef<str>, input: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Validation, operation, message).with_input(input)
	}

	pub fn network(operation: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Network, operation, message).retryable(true)
	}

	pub fn timeout(operation: impl AsRef<str>) -> Self {
		Self::new(ErrorCategory::Timeout, operation, "operation timed out").retryable(true)
	}

	pub fn config(operation: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Config, operation, message).critical(true)
	}

	pub fn file_io(operation: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::FileIo, operation, message).critical(true)
	}

	pub fn security_probe(operation: impl AsRef<str>, message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::SecurityProbe, operation, message)
	}

	/// Whether this error's `message` matches one of the configured
	/// retryable substrings.
	pub fn matches_retryable(&self, retryable_substrings: &[String]) -> bool {
		if !self.retryable {
			return false;
		}
		if retryable_substrings.is_empty() {
			return true;
		}
		retryable_substrings
			.iter()
			.any(|pat| self.message.contains(pat.as_str()))
	}
}

/// Strip control characters and cap length before an input is logged or
/// surfaced in a ProxyHawkError / serialized output.
pub fn sanitize_for_log(input: &str) -> String {
	const MAX_LEN: usize = 256;
	let cleaned: String = input
		.chars()
		.filter(|c| !c.is_control() || *c == ' ')
		.take(MAX_LEN)
		.collect();
	if input.chars().count() > MAX_LEN {
		format!("{cleaned}...")
	} else {
		cleaned
	}
}

pub type Result<T> = std::result::Result<T, ProxyHawkError>;
