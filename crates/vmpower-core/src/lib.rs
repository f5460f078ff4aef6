//! # vmpower-core
//!
//! Samples host power, GPU power, CPU frequency and CPU temperature through
//! the hypervisor host's CLI tools, and splits CPU time per running domain so
//! host power can be attributed to guests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vmpower_core::{PowerSampler, SamplerConfig, SystemRunner, publish, MetricRecord};
//!
//! let config = SamplerConfig::default();
//! let runner = SystemRunner::new(config.elevation);
//! let mut sampler = PowerSampler::new(config, Box::new(runner));
//!
//! let sample = sampler.sample().expect("power sensors available");
//! let mut records: Vec<MetricRecord> = Vec::new();
//! publish(&sample, &mut records);
//! ```
//!
//! ## Architecture
//!
//! Runner → Parsers → Sensors → Sampler → Emission
//!
//! The [`PowerSampler`] is the only stateful piece: it keeps the previous
//! cycle's per-domain CPU snapshots to turn cumulative counters into rates.

pub mod config;
pub mod emission;
pub mod error;
pub mod model;
pub mod parse;
pub mod runner;
pub mod sampler;
pub mod sensors;

pub use config::{DEFAULT_COMPUTE_DRIVER, Elevation, SamplerConfig};
pub use emission::{
    DEFINITIONS, MetricDefinition, MetricRecord, MetricSink, ValueKind, definition, emit, publish,
};
pub use error::{Result, SamplerError};
pub use model::{InstanceCpuSnapshot, MetricKey, NodeTopology, SensorSample, unix_us_now};
pub use runner::{CommandRunner, ScriptedRunner, SystemRunner, command_exists, running_as_root};
pub use sampler::{
    MONITOR_NAME, PowerSampler, PreviousCycleState, compute_utilization, utilization_between,
};
pub use sensors::{Sensors, TOOLS};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
