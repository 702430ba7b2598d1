//! Metadata resolution engine with fallback and resilience machinery.
//!
//! This module turns a title or release filename into rich movie/TV metadata
//! by walking an ordered chain of external sources, tolerating the ways those
//! sources fail: quotas, outages, missing locales, and flaky networks.
//!
//! # Module layout
//!
//! - [`provider`] -- Capability trait and shared data types.
//! - [`providers`] -- Concrete sources (TMDB, Douban, Wikipedia).
//! - [`semantic`] -- AI filename parsing, the chain's last resort.
//! - [`http`] -- Rate-limited, cancellable HTTP client shared by sources.
//! - [`error`] -- Canonical provider error taxonomy.
//! - [`health`] -- Consecutive-failure health tracking per source.
//! - [`locale`] -- Locale fallback search across a configured chain.
//! - [`cache`] -- Cache-aside layer over the SQLite store.
//! - [`retry`] -- Durable retry queue with exponential backoff.
//! - [`coordinator`] -- The fallback chain walk producing degraded results.
//! - [`resolver`] -- Cache-fronted entry point wiring everything together.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod http;
pub mod locale;
pub mod provider;
pub mod providers;
pub mod resolver;
pub mod retry;
pub mod semantic;

pub use coordinator::{DegradationLevel, DegradedResult, FallbackChain, ResolveRequest};
pub use error::ProviderError;
pub use health::{HealthStatus, HealthTracker, ServiceHealth};
pub use provider::{MediaMetadata, MetadataProvider, SearchQuery, SearchResult};
pub use resolver::MetadataResolver;
pub use retry::{DrainSummary, RetryHandler, RetryQueue};
