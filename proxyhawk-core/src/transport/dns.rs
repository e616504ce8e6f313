//! DNS resolution. Needed both for ordinary dialing and so the DNS-rebinding
//! probe can observe whether two lookups of the same name return different
//! answers.

use crate::prelude::*;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use std::net::IpAddr;

pub struct Resolver {
	inner: TokioResolver,
}

impl Resolver {
	pub fn system() -> Self {
		let inner = TokioResolver::builder_with_config(
			ResolverConfig::cloudflare(),
			TokioConnectionProvider::default(),
		)
		.with_options(ResolverOpts::default())
		.build();
		Self { inner }
	}

	/// Resolve a name to every address currently returned, in the order the
	/// resolver produced them. Two calls separated in time may legitimately
	/// return different answers — that's what the rebinding probe checks for.
	pub async fn resolve(&self, name: &str) -> crate::error::Result<Vec<IpAddr>> {
		if let Ok(ip) = name.parse::<IpAddr>() {
			return Ok(vec![ip]);
		}
		let lookup = self
			.inner
			.lookup_ip(name)
			.await
			.map_err(|e| crate::error::ProxyHawkError::network("dns_resolve", e.to_string()))?;
		Ok(lookup.iter().collect())
	}
}
