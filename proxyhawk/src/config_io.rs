//! Loads the YAML configuration document. Parsing lives here, in the
//! binary, so `proxyhawk-core` stays free of a concrete file format.

use std::path::Path;

use anyhow::Context;
use proxyhawk_core::config::Config;

pub fn load(path: &Path) -> anyhow::Result<Config> {
	let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
	let config: Config = serde_yaml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
	Ok(config)
}
