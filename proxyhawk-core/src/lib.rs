//! Concurrent proxy validator and security auditor. Given a batch of
//! candidate proxy endpoints, decides whether each is usable, classifies its
//! anonymity and cloud affiliation, and probes it for the security defects
//! an open forward proxy can expose (SSRF, host-header injection, request
//! smuggling, DNS rebinding, parser-differential bypasses).
//!
//! This crate owns the pipeline end to end; CLI parsing, config-file
//! parsing, output writers and a TUI are external collaborators that
//! consume its public types and the [`events::EventStream`].

pub mod aggregate;
pub mod candidate;
pub mod classify;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod httpclient;
pub mod oob;
pub mod pipeline;
pub mod prelude;
pub mod probes;
pub mod ratelimit;
pub mod retry;
pub mod transport;
pub mod types;
pub mod validate;
pub mod whois;

pub use aggregate::Aggregator;
pub use candidate::Validator;
pub use config::Config;
pub use error::{ErrorCategory, ProxyHawkError};
pub use events::{Event, EventPublisher, EventStream};
pub use pipeline::Pipeline;
pub use types::{ProxyCandidate, ProxyResult, RunSummary};
