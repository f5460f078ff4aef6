//! Typed records built at the parse boundary.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};
use crate::parse::KeyValueBlock;

/// Wall-clock time in microseconds since the Unix epoch.
pub fn unix_us_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

// ---------------------------------------------------------------------------
// Node topology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTopology {
    /// Host CPU count. Always greater than zero.
    pub core_count: u32,
}

impl NodeTopology {
    /// Build from `virsh nodeinfo` fields, requiring a positive `CPU(s)`.
    pub fn from_block(block: &KeyValueBlock) -> Result<Self> {
        let raw = block
            .get("CPU(s)")
            .ok_or_else(|| SamplerError::missing("CPU(s)", "nodeinfo"))?;
        let core_count = raw
            .parse::<u32>()
            .map_err(|e| SamplerError::parse("CPU(s)", raw, e))?;
        if core_count == 0 {
            return Err(SamplerError::InvalidTopology { core_count });
        }
        Ok(Self { core_count })
    }
}

// ---------------------------------------------------------------------------
// Per-instance CPU accounting
// ---------------------------------------------------------------------------

/// Cumulative CPU time of one domain at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCpuSnapshot {
    pub instance_id: u32,
    pub timestamp_unix_us: u64,
    /// Sum of `vcpu.N.time` over all current vCPUs.
    pub cumulative_cpu_time_ns: u64,
}

impl InstanceCpuSnapshot {
    /// Build from `virsh domstats` fields: sums `vcpu.N.time` for every N
    /// below `vcpu.current`.
    pub fn from_stats(instance_id: u32, timestamp_unix_us: u64, stats: &KeyValueBlock) -> Result<Self> {
        let context = format!("domstats {instance_id}");
        let current = stats
            .get("vcpu.current")
            .ok_or_else(|| SamplerError::missing("vcpu.current", &context))?;
        let vcpus = current
            .parse::<u32>()
            .map_err(|e| SamplerError::parse("vcpu.current", current, e))?;

        let mut total: u64 = 0;
        for n in 0..vcpus {
            let key = format!("vcpu.{n}.time");
            let raw = stats
                .get(&key)
                .ok_or_else(|| SamplerError::missing(&key, &context))?;
            let ns = raw
                .parse::<u64>()
                .map_err(|e| SamplerError::parse(&key, raw, e))?;
            total = total.saturating_add(ns);
        }

        Ok(Self {
            instance_id,
            timestamp_unix_us,
            cumulative_cpu_time_ns: total,
        })
    }
}

// ---------------------------------------------------------------------------
// Sample bundle
// ---------------------------------------------------------------------------

/// Host-level quantity carried by a [`SensorSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKey {
    #[serde(rename = "ipmi.power")]
    HostPower,
    #[serde(rename = "gpu.power")]
    GpuPower,
    #[serde(rename = "average.cpu.frequency")]
    AvgCpuFrequency,
    #[serde(rename = "average.cpu.temperature")]
    AvgCpuTemperature,
}

impl MetricKey {
    pub const ALL: [MetricKey; 4] = [
        MetricKey::HostPower,
        MetricKey::GpuPower,
        MetricKey::AvgCpuFrequency,
        MetricKey::AvgCpuTemperature,
    ];

    /// Stable metric name.
    pub fn name(self) -> &'static str {
        match self {
            Self::HostPower => "ipmi.power",
            Self::GpuPower => "gpu.power",
            Self::AvgCpuFrequency => "average.cpu.frequency",
            Self::AvgCpuTemperature => "average.cpu.temperature",
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one sampling cycle. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp_unix_us: u64,
    /// Compute driver tag of the sampler that produced this sample.
    pub source: String,
    /// Absent when the attribution phase failed.
    pub hostname: Option<String>,
    pub values: BTreeMap<MetricKey, f64>,
    /// Per-domain CPU share for this cycle. Computed, not emitted.
    pub utilization: BTreeMap<u32, f64>,
}

impl SensorSample {
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values.get(&key).copied()
    }
}
