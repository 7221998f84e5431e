//! actionscale-client — rate-limited upstream access behind a shared cache.
//!
//! # Architecture
//!
//! ```text
//! CachingClient
//!   ├── FlightGroup        one refresh per workflow at a time
//!   ├── StateProvider      last snapshot, status, forced-scale schedule
//!   ├── DataSource         GitHub REST (or a fake in tests)
//!   ├── MetricsRecorder    queue length, queries, token credits
//!   └── Clock              decides freshness against the cache windows
//! ```
//!
//! A snapshot is served from the cache while it is valid and younger than
//! the cache window (a shorter window applies when the last snapshot was
//! empty). Otherwise the data source is called and the result, success or
//! failure, is written back.

pub mod caching;
pub mod error;
pub mod flight;
pub mod github;
pub mod source;

pub use caching::{CacheWindows, CachingClient, QueuedJobs};
pub use error::{ClientError, ClientResult, SourceError, SourceResult};
pub use flight::{FlightGroup, FlightGuard};
pub use github::{GitHubDataSource, GitHubSourceFactory};
pub use source::{DataSource, DataSourceFactory, TokenCredits, tokenize_token};
