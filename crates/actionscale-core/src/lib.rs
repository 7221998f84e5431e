//! actionscale-core — shared types for the workflow-queue metrics pipeline.
//!
//! Holds the domain model (workflow configs, queued job records, workflow
//! definition info), the scaling function that maps queue length to a
//! desired runner count, the clock abstraction used by the cache, and the
//! TOML configuration parser for the daemon.

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod scaling;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdapterConfig;
pub use error::{ConfigError, ConfigResult};
pub use scaling::{ForcedScale, ScalingPolicy};
pub use types::*;
