//! The sampling engine.
//!
//! One call to [`PowerSampler::sample`] is one cycle:
//!
//! 1. Attribution phase: hostname, node topology, running domains, and a CPU
//!    snapshot per domain. Utilization is derived against the previous
//!    cycle's snapshots, which are then replaced wholesale (a running domain
//!    whose stats could not be read keeps its old snapshot). Any failure here
//!    is logged and swallowed; the baseline stays untouched.
//! 2. Aggregate phase: host power, GPU power, average frequency, average
//!    temperature. Any failure here fails the cycle with
//!    [`SamplerError::Monitor`].
//!
//! Cycles must not overlap; `sample` takes `&mut self`.

use std::collections::{BTreeMap, HashMap};

use log::{debug, error, info, warn};

use crate::config::SamplerConfig;
use crate::error::{Result, SamplerError};
use crate::model::{InstanceCpuSnapshot, MetricKey, SensorSample, unix_us_now};
use crate::runner::CommandRunner;
use crate::sensors::{CpuSnapshots, Sensors};

/// Monitor name reported in [`SamplerError::Monitor`].
pub const MONITOR_NAME: &str = "ComputeDriverPowerMonitor";

/// Per-domain snapshots from the last successful attribution phase.
pub type PreviousCycleState = HashMap<u32, InstanceCpuSnapshot>;

// ---------------------------------------------------------------------------
// Utilization
// ---------------------------------------------------------------------------

/// Share of total host CPU time `current` consumed since `previous`.
///
/// Returns `Ok(None)` when the cumulative counter went backwards (the domain
/// id was reused by a restarted guest), and an error when the clock did not
/// advance between the two snapshots.
pub fn utilization_between(
    previous: &InstanceCpuSnapshot,
    current: &InstanceCpuSnapshot,
    core_count: u32,
) -> Result<Option<f64>> {
    if core_count == 0 {
        return Err(SamplerError::InvalidTopology { core_count });
    }
    if current.timestamp_unix_us <= previous.timestamp_unix_us {
        return Err(SamplerError::NonMonotonicClock {
            instance_id: current.instance_id,
        });
    }
    let Some(cpu_time_delta_ns) = current
        .cumulative_cpu_time_ns
        .checked_sub(previous.cumulative_cpu_time_ns)
    else {
        return Ok(None);
    };
    let interval_secs = (current.timestamp_unix_us - previous.timestamp_unix_us) as f64 / 1e6;
    Ok(Some(
        cpu_time_delta_ns as f64 / (interval_secs * f64::from(core_count) * 1e9),
    ))
}

/// Utilization for every domain present in both snapshot sets.
///
/// Domains seen for the first time produce no value. Domains whose pair of
/// snapshots is unusable are logged and left out.
pub fn compute_utilization(
    current: &HashMap<u32, InstanceCpuSnapshot>,
    previous: &PreviousCycleState,
    core_count: u32,
) -> Result<BTreeMap<u32, f64>> {
    if core_count == 0 {
        return Err(SamplerError::InvalidTopology { core_count });
    }
    let mut out = BTreeMap::new();
    for (id, snap) in current {
        let Some(prev) = previous.get(id) else {
            debug!("domain {id}: first sighting, baseline only");
            continue;
        };
        match utilization_between(prev, snap, core_count) {
            Ok(Some(fraction)) => {
                out.insert(*id, fraction);
            }
            Ok(None) => debug!("domain {id}: cpu time went backwards, rebaselining"),
            Err(e) => warn!("domain {id}: {e}"),
        }
    }
    Ok(out)
}

/// Next baseline: this cycle's snapshots, plus the previous snapshot of each
/// still-running domain whose stats could not be read this cycle.
fn carry_over_skipped(
    mut taken: HashMap<u32, InstanceCpuSnapshot>,
    skipped: &[u32],
    previous: &PreviousCycleState,
) -> PreviousCycleState {
    for id in skipped {
        if let Some(prev) = previous.get(id) {
            taken.insert(*id, *prev);
        }
    }
    taken
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

struct Attribution {
    hostname: String,
    snapshots: HashMap<u32, InstanceCpuSnapshot>,
    utilization: BTreeMap<u32, f64>,
}

/// Owns the cross-cycle state and runs sampling cycles.
pub struct PowerSampler {
    config: SamplerConfig,
    runner: Box<dyn CommandRunner>,
    previous: PreviousCycleState,
    clock: fn() -> u64,
    cycles: u64,
}

impl PowerSampler {
    pub fn new(config: SamplerConfig, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            previous: PreviousCycleState::new(),
            clock: unix_us_now,
            cycles: 0,
        }
    }

    /// Replace the wall clock (unix microseconds).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Monitor name and driver tag, e.g. `ComputeDriverPowerMonitor(libvirt.LibvirtDriver)`.
    pub fn identity(&self) -> String {
        format!("{MONITOR_NAME}({})", self.config.compute_driver)
    }

    /// Snapshots the next cycle will diff against.
    pub fn baseline(&self) -> &PreviousCycleState {
        &self.previous
    }

    /// Number of cycles attempted so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one sampling cycle.
    pub fn sample(&mut self) -> Result<SensorSample> {
        self.cycles += 1;
        let timestamp_unix_us = (self.clock)();

        let (hostname, utilization) = match self.attribute() {
            Ok(a) => {
                debug!(
                    "cycle {}: {} domain(s), {} with utilization",
                    self.cycles,
                    a.snapshots.len(),
                    a.utilization.len()
                );
                self.previous = a.snapshots;
                (Some(a.hostname), a.utilization)
            }
            Err(e) => {
                error!("unable to split host power per instance: {e}");
                (None, BTreeMap::new())
            }
        };

        let values = self.read_aggregates().map_err(|e| {
            error!("power sensor failed, {} disabled for this cycle: {e}", self.identity());
            SamplerError::Monitor {
                monitor: self.identity(),
                source: Box::new(e),
            }
        })?;
        info!(
            "cycle {}: {}",
            self.cycles,
            values
                .iter()
                .map(|(k, v)| format!("{k}={v:.2}"))
                .collect::<Vec<_>>()
                .join(" ")
        );

        Ok(SensorSample {
            timestamp_unix_us,
            source: self.config.compute_driver.clone(),
            hostname,
            values,
            utilization,
        })
    }

    fn attribute(&self) -> Result<Attribution> {
        let sensors = Sensors::new(self.runner.as_ref(), &self.config);
        let hostname = sensors.hostname()?;
        let topology = sensors.topology()?;
        let instances = sensors.running_instances()?;
        let CpuSnapshots { taken, skipped } = sensors.cpu_snapshots(&instances, self.clock);
        let utilization = compute_utilization(&taken, &self.previous, topology.core_count)?;
        let snapshots = carry_over_skipped(taken, &skipped, &self.previous);
        Ok(Attribution {
            hostname,
            snapshots,
            utilization,
        })
    }

    fn read_aggregates(&self) -> Result<BTreeMap<MetricKey, f64>> {
        let sensors = Sensors::new(self.runner.as_ref(), &self.config);
        let mut values = BTreeMap::new();
        values.insert(MetricKey::HostPower, sensors.host_power()?);
        if self.config.gpu_enabled {
            values.insert(MetricKey::GpuPower, sensors.gpu_power()?);
        }
        values.insert(MetricKey::AvgCpuFrequency, sensors.avg_cpu_frequency()?);
        values.insert(MetricKey::AvgCpuTemperature, sensors.avg_cpu_temperature()?);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(id: u32, ts_us: u64, cpu_ns: u64) -> InstanceCpuSnapshot {
        InstanceCpuSnapshot {
            instance_id: id,
            timestamp_unix_us: ts_us,
            cumulative_cpu_time_ns: cpu_ns,
        }
    }

    // -----------------------------------------------------------------------
    // utilization_between
    // -----------------------------------------------------------------------

    #[test]
    fn one_full_core_of_four() {
        // 10 s of wall time, 10 s of CPU time, 4 cores -> 25%.
        let prev = snap(1, 0, 0);
        let cur = snap(1, 10_000_000, 10_000_000_000);
        let u = utilization_between(&prev, &cur, 4).unwrap().unwrap();
        assert!((u - 0.25).abs() < 1e-12);
    }

    #[test]
    fn idle_domain_is_zero() {
        let u = utilization_between(&snap(1, 0, 500), &snap(1, 1_000_000, 500), 8)
            .unwrap()
            .unwrap();
        assert_eq!(u, 0.0);
    }

    #[test]
    fn deterministic_and_non_negative() {
        let prev = snap(3, 1_000, 123_456_789);
        let cur = snap(3, 2_501_000, 987_654_321);
        let a = utilization_between(&prev, &cur, 6).unwrap().unwrap();
        let b = utilization_between(&prev, &cur, 6).unwrap().unwrap();
        assert_eq!(a, b);
        assert!(a >= 0.0);
    }

    #[test]
    fn stalled_clock_rejected() {
        let err = utilization_between(&snap(2, 5, 0), &snap(2, 5, 10), 4).unwrap_err();
        assert!(matches!(err, SamplerError::NonMonotonicClock { instance_id: 2 }));
    }

    #[test]
    fn counter_reset_yields_nothing() {
        assert_eq!(
            utilization_between(&snap(2, 0, 1000), &snap(2, 10, 10), 4).unwrap(),
            None
        );
    }

    #[test]
    fn zero_cores_rejected() {
        assert!(matches!(
            utilization_between(&snap(1, 0, 0), &snap(1, 1, 1), 0),
            Err(SamplerError::InvalidTopology { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // compute_utilization
    // -----------------------------------------------------------------------

    #[test]
    fn new_domains_have_no_value() {
        let previous: PreviousCycleState = [(1, snap(1, 0, 0))].into_iter().collect();
        let current: HashMap<u32, InstanceCpuSnapshot> =
            [(1, snap(1, 1_000_000, 500_000_000)), (2, snap(2, 1_000_000, 9))]
                .into_iter()
                .collect();
        let out = compute_utilization(&current, &previous, 2).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[&1] - 0.25).abs() < 1e-12);
        assert!(!out.contains_key(&2));
    }

    #[test]
    fn skipped_domain_keeps_previous_snapshot() {
        let previous: PreviousCycleState =
            [(1, snap(1, 0, 100)), (4, snap(4, 0, 7))].into_iter().collect();
        let taken: HashMap<u32, InstanceCpuSnapshot> = [(2, snap(2, 5, 9))].into_iter().collect();
        let next = carry_over_skipped(taken, &[1, 3], &previous);
        assert_eq!(next.len(), 2);
        assert_eq!(next[&1], snap(1, 0, 100));
        assert_eq!(next[&2], snap(2, 5, 9));
        // Domain 4 is no longer running; domain 3 has no history.
        assert!(!next.contains_key(&4));
        assert!(!next.contains_key(&3));
    }

    #[test]
    fn zero_cores_fails_whole_computation() {
        let current: HashMap<u32, InstanceCpuSnapshot> = HashMap::new();
        assert!(compute_utilization(&current, &PreviousCycleState::new(), 0).is_err());
    }
}
