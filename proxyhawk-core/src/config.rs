//! Declarative configuration. Parsing the document itself, and the
//! file-watcher that produces reload notifications, live in the binary
//! crate — this module only owns the struct and its defaults.

use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestUrl {
	pub url: String,
	#[serde(default)]
	pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestUrlsConfig {
	#[serde(default = "default_test_url")]
	pub default_url: String,
	#[serde(default = "default_required_success_count")]
	pub required_success_count: usize,
	#[serde(default)]
	pub urls: Vec<TestUrl>,
}

fn default_test_url() -> String {
	"http://httpbin.org/get".to_string()
}
fn default_required_success_count() -> usize {
	1
}

impl Default for TestUrlsConfig {
	fn default() -> Self {
		Self {
			default_url: default_test_url(),
			required_success_count: default_required_success_count(),
			urls: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
	#[serde(default = "default_min_response_bytes")]
	pub min_response_bytes: usize,
	#[serde(default = "default_disallowed_keywords")]
	pub disallowed_keywords: Vec<String>,
	#[serde(default)]
	pub require_content_match: Option<String>,
}

fn default_min_response_bytes() -> usize {
	100
}
fn default_disallowed_keywords() -> Vec<String> {
	[
		"Access Denied",
		"Proxy Error",
		"Bad Gateway",
		"Gateway Timeout",
		"Service Unavailable",
	]
	.into_iter()
	.map(String::from)
	.collect()
}

impl Default for ValidationConfig {
	fn default() -> Self {
		Self {
			min_response_bytes: default_min_response_bytes(),
			disallowed_keywords: default_disallowed_keywords(),
			require_content_match: None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct AdvancedChecks {
	#[serde(default)]
	pub test_protocol_smuggling: bool,
	#[serde(default)]
	pub test_dns_rebinding: bool,
	#[serde(default)]
	pub test_host_header_injection: bool,
	#[serde(default)]
	pub test_cache_poisoning: bool,
	#[serde(default)]
	pub test_ipv6: bool,
	#[serde(default)]
	pub test_http_methods: Vec<String>,
	#[serde(default)]
	pub test_path_traversal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CloudProvider {
	pub name: String,
	#[serde(default)]
	pub metadata_ips: Vec<String>,
	#[serde(default)]
	pub metadata_urls: Vec<String>,
	#[serde(default)]
	pub internal_ranges: Vec<String>,
	#[serde(default)]
	pub org_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
	#[serde(default = "default_timeout", with = "duration_secs")]
	pub timeout: Duration,
	#[serde(default = "default_concurrency")]
	pub concurrency: usize,
	#[serde(default = "default_true")]
	pub insecure_skip_verify: bool,
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
	#[serde(default)]
	pub default_headers: HashMap<String, String>,

	#[serde(default)]
	pub test_urls: TestUrlsConfig,
	#[serde(default)]
	pub validation: ValidationConfig,

	#[serde(default)]
	pub rate_limit_enabled: bool,
	#[serde(default = "default_one_sec", with = "duration_secs")]
	pub rate_limit_delay: Duration,
	#[serde(default = "default_true")]
	pub rate_limit_per_host: bool,
	#[serde(default)]
	pub rate_limit_per_proxy: bool,

	#[serde(default)]
	pub retry_enabled: bool,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_one_sec", with = "duration_secs")]
	pub initial_retry_delay: Duration,
	#[serde(default = "default_max_retry_delay", with = "duration_secs")]
	pub max_retry_delay: Duration,
	#[serde(default = "default_backoff_factor")]
	pub backoff_factor: f64,
	#[serde(default)]
	pub retryable_errors: Vec<String>,

	#[serde(default)]
	pub auth_enabled: bool,
	#[serde(default)]
	pub default_username: Option<String>,
	#[serde(default)]
	pub default_password: Option<String>,

	#[serde(default)]
	pub advanced_checks: AdvancedChecks,
	#[serde(default)]
	pub cloud_providers: Vec<CloudProvider>,

	#[serde(default)]
	pub interactsh_url: Option<String>,
	#[serde(default)]
	pub interactsh_token: Option<String>,

	#[serde(default)]
	pub allow_private_hosts: bool,
}

fn default_timeout() -> Duration {
	Duration::from_secs(10)
}
fn default_concurrency() -> usize {
	10
}
fn default_true() -> bool {
	true
}
fn default_user_agent() -> String {
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
		.to_string()
}
fn default_one_sec() -> Duration {
	Duration::from_secs(1)
}
fn default_max_retries() -> u32 {
	3
}
fn default_max_retry_delay() -> Duration {
	Duration::from_secs(30)
}
fn default_backoff_factor() -> f64 {
	2.0
}

impl Default for Config {
	fn default() -> Self {
		Self {
			timeout: default_timeout(),
			concurrency: default_concurrency(),
			insecure_skip_verify: true,
			user_agent: default_user_agent(),
			default_headers: HashMap::new(),
			test_urls: TestUrlsConfig::default(),
			validation: ValidationConfig::default(),
			rate_limit_enabled: false,
			rate_limit_delay: default_one_sec(),
			rate_limit_per_host: true,
			rate_limit_per_proxy: false,
			retry_enabled: false,
			max_retries: default_max_retries(),
			initial_retry_delay: default_one_sec(),
			max_retry_delay: default_max_retry_delay(),
			backoff_factor: default_backoff_factor(),
			retryable_errors: Vec::new(),
			auth_enabled: false,
			default_username: None,
			default_password: None,
			advanced_checks: AdvancedChecks::default(),
			cloud_providers: Vec::new(),
			interactsh_url: None,
			interactsh_token: None,
			allow_private_hosts: false,
		}
	}
}

mod duration_secs {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_f64(d.as_secs_f64())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = f64::deserialize(d)?;
		Ok(Duration::from_secs_f64(secs))
	}
}

/// Sent on config hot-reload: the running batch keeps its original
/// snapshot, a subsequent run picks up the new one.
pub type ConfigWatch = tokio::sync::watch::Receiver<Arc<Config>>;
