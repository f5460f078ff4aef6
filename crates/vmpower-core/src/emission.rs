//! Metric emission: names, units and value kinds of the exported gauges.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};
use crate::model::{MetricKey, SensorSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Gauge,
}

/// Static description of one exported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub key: MetricKey,
    pub unit: &'static str,
    pub kind: ValueKind,
}

pub const DEFINITIONS: [MetricDefinition; 4] = [
    MetricDefinition {
        key: MetricKey::HostPower,
        unit: "W",
        kind: ValueKind::Gauge,
    },
    MetricDefinition {
        key: MetricKey::GpuPower,
        unit: "W",
        kind: ValueKind::Gauge,
    },
    MetricDefinition {
        key: MetricKey::AvgCpuFrequency,
        unit: "GHz",
        kind: ValueKind::Gauge,
    },
    MetricDefinition {
        key: MetricKey::AvgCpuTemperature,
        unit: "C",
        kind: ValueKind::Gauge,
    },
];

pub fn definition(key: MetricKey) -> MetricDefinition {
    let unit = match key {
        MetricKey::HostPower | MetricKey::GpuPower => "W",
        MetricKey::AvgCpuFrequency => "GHz",
        MetricKey::AvgCpuTemperature => "C",
    };
    MetricDefinition {
        key,
        unit,
        kind: ValueKind::Gauge,
    }
}

/// One metric ready for the telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub kind: ValueKind,
    pub timestamp_unix_us: u64,
    pub source: String,
}

/// Delivery side of the telemetry pipeline.
pub trait MetricSink {
    fn deliver(&mut self, record: MetricRecord);
}

impl MetricSink for Vec<MetricRecord> {
    fn deliver(&mut self, record: MetricRecord) {
        self.push(record);
    }
}

/// Build the record for `key`. Fails if the sample lacks the value.
pub fn emit(sample: &SensorSample, key: MetricKey) -> Result<MetricRecord> {
    let def = definition(key);
    let value = sample.get(key).ok_or_else(|| SamplerError::MissingMetric {
        key: key.name().to_string(),
    })?;
    Ok(MetricRecord {
        name: key.name().to_string(),
        value,
        unit: def.unit.to_string(),
        kind: def.kind,
        timestamp_unix_us: sample.timestamp_unix_us,
        source: sample.source.clone(),
    })
}

/// Deliver every metric present in `sample`. Returns how many were sent.
pub fn publish(sample: &SensorSample, sink: &mut dyn MetricSink) -> usize {
    let mut sent = 0;
    for def in DEFINITIONS {
        if let Ok(record) = emit(sample, def.key) {
            sink.deliver(record);
            sent += 1;
        }
    }
    sent
}
