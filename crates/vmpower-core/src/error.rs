//! Error types for the sampler.
//!
//! Every failure a cycle can hit is a variant of [`SamplerError`]. Command and
//! parse failures bubble up from the sensor fetchers; the engine wraps
//! aggregate-sensor failures in [`SamplerError::Monitor`] before handing them
//! to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

#[derive(Error, Debug)]
pub enum SamplerError {
    // Command execution
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Execution { command: String, status: String },

    // Parsing
    #[error("missing field '{field}' in {context} output")]
    MissingField { field: String, context: String },

    #[error("cannot parse {field} from '{value}': {reason}")]
    Parse {
        field: String,
        value: String,
        reason: String,
    },

    #[error("no qualifying readings for {quantity}")]
    EmptyData { quantity: String },

    // Engine
    #[error("node reports {core_count} CPUs; utilization needs at least one")]
    InvalidTopology { core_count: u32 },

    #[error("snapshot clock for domain {instance_id} did not advance")]
    NonMonotonicClock { instance_id: u32 },

    #[error("metric '{key}' not present in sample")]
    MissingMetric { key: String },

    #[error("invalid config at {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{monitor}: power sensors failed, monitor disabled for this cycle: {source}")]
    Monitor {
        monitor: String,
        #[source]
        source: Box<SamplerError>,
    },
}

impl SamplerError {
    /// Whether the error came from running an external command.
    pub fn is_execution(&self) -> bool {
        match self {
            Self::Launch { .. } | Self::Execution { .. } => true,
            Self::Monitor { source, .. } => source.is_execution(),
            _ => false,
        }
    }

    /// Whether the error is an explicit empty-data failure.
    pub fn is_empty_data(&self) -> bool {
        match self {
            Self::EmptyData { .. } => true,
            Self::Monitor { source, .. } => source.is_empty_data(),
            _ => false,
        }
    }

    pub(crate) fn missing(field: &str, context: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        }
    }

    pub(crate) fn parse(field: &str, value: &str, reason: impl ToString) -> Self {
        Self::Parse {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn empty(quantity: &str) -> Self {
        Self::EmptyData {
            quantity: quantity.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_error_reports_cause_kind() {
        let err = SamplerError::Monitor {
            monitor: "ComputeDriverPowerMonitor".to_string(),
            source: Box::new(SamplerError::empty("gpu.power")),
        };
        assert!(err.is_empty_data());
        assert!(!err.is_execution());
        assert!(err.to_string().starts_with("ComputeDriverPowerMonitor"));
    }

    #[test]
    fn execution_message_names_command() {
        let err = SamplerError::Execution {
            command: "virsh nodeinfo".to_string(),
            status: "exit status: 1".to_string(),
        };
        assert!(err.is_execution());
        assert_eq!(err.to_string(), "`virsh nodeinfo` exited with exit status: 1");
    }
}
