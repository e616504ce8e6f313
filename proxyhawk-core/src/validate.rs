//! Response validator: decides whether one proxied response is evidence of
//! a working proxy.

use crate::config::{Config, TestUrlsConfig};
use crate::httpclient::RawResponse;
use crate::prelude::*;

pub struct ResponseValidator<'a> {
	pub min_response_bytes: usize,
	pub disallowed_keywords: &'a [String],
	pub require_content_match: Option<&'a str>,
}

impl<'a> ResponseValidator<'a> {
	pub fn from_config(cfg: &'a Config) -> Self {
		Self {
			min_response_bytes: cfg.validation.min_response_bytes,
			disallowed_keywords: &cfg.validation.disallowed_keywords,
			require_content_match: cfg.validation.require_content_match.as_deref(),
		}
	}

	/// Is this one response evidence of a working proxy?
	pub fn is_valid(&self, response: &RawResponse) -> bool {
		let Some(status) = response.status else {
			return false;
		};
		if !(200..300).contains(&status) {
			return false;
		}
		if response.body.len() < self.min_response_bytes {
			return false;
		}
		let body_text = String::from_utf8_lossy(&response.body);
		if self.disallowed_keywords.iter().any(|kw| body_text.contains(kw.as_str())) {
			return false;
		}
		if let Some(needle) = self.require_content_match {
			if !body_text.contains(needle) {
				return false;
			}
		}
		true
	}
}

/// A proxy is declared working when at least ⌈N/2⌉ of N configured test
/// URLs pass validation, AND every URL marked `required` passed.
pub fn decide_working(results: &[(bool, bool)]) -> bool {
	// (passed, required)
	if results.is_empty() {
		return false;
	}
	let required_ok = results.iter().filter(|(_, req)| *req).all(|(passed, _)| *passed);
	if !required_ok {
		return false;
	}
	let passed = results.iter().filter(|(p, _)| *p).count();
	let needed = results.len().div_ceil(2);
	passed >= needed
}

pub fn test_url_list(cfg: &TestUrlsConfig) -> Vec<(String, bool)> {
	if cfg.urls.is_empty() {
		vec![(cfg.default_url.clone(), true)]
	} else {
		cfg.urls.iter().map(|u| (u.url.clone(), u.required)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resp(status: u16, body: &str) -> RawResponse {
		RawResponse {
			status: Some(status),
			headers: Vec::new(),
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn rejects_short_body() {
		let v = ResponseValidator {
			min_response_bytes: 100,
			disallowed_keywords: &[],
			require_content_match: None,
		};
		assert!(!v.is_valid(&resp(200, "short")));
	}

	#[test]
	fn rejects_disallowed_keyword() {
		let kws = vec!["Access Denied".to_string()];
		let v = ResponseValidator {
			min_response_bytes: 1,
			disallowed_keywords: &kws,
			require_content_match: None,
		};
		assert!(!v.is_valid(&resp(200, "Access Denied: blocked")));
	}

	#[test]
	fn majority_rule_with_required() {
		// 1 of 3 passed, but the required one failed -> not working.
		assert!(!decide_working(&[(false, true), (true, false), (false, false)]));
		// 2 of 3 passed, required one passed -> working (>= ceil(3/2)=2).
		assert!(decide_working(&[(true, true), (true, false), (false, false)]));
		// 1 of 1, required and passed.
		assert!(decide_working(&[(true, true)]));
	}
}
