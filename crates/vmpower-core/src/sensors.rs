//! Sensor fetchers: one external tool invocation plus the matching parser.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::config::SamplerConfig;
use crate::error::{Result, SamplerError};
use crate::model::{InstanceCpuSnapshot, NodeTopology};
use crate::parse;
use crate::runner::CommandRunner;

pub const VIRSH: &str = "virsh";
pub const IPMI_DCMI: &str = "ipmi-dcmi";
pub const NVIDIA_SMI: &str = "nvidia-smi";
pub const CPUFREQ_APERF: &str = "cpufreq-aperf";
pub const IPMITOOL: &str = "ipmitool";

/// Every external tool the sampler may invoke.
pub const TOOLS: &[&str] = &[VIRSH, IPMI_DCMI, NVIDIA_SMI, CPUFREQ_APERF, IPMITOOL];

/// Outcome of snapshotting every running domain.
#[derive(Debug, Default)]
pub struct CpuSnapshots {
    pub taken: HashMap<u32, InstanceCpuSnapshot>,
    /// Running domains whose stats could not be read this cycle.
    pub skipped: Vec<u32>,
}

/// Fetchers bound to a runner and config for the duration of one cycle.
pub struct Sensors<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a SamplerConfig,
}

impl<'a> Sensors<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a SamplerConfig) -> Self {
        Self { runner, config }
    }

    // -----------------------------------------------------------------------
    // Hypervisor
    // -----------------------------------------------------------------------

    pub fn hostname(&self) -> Result<String> {
        let out = self.runner.run(VIRSH, &["hostname"])?;
        Ok(out.trim().to_string())
    }

    pub fn topology(&self) -> Result<NodeTopology> {
        let out = self.runner.run(VIRSH, &["nodeinfo"])?;
        NodeTopology::from_block(&parse::key_value_lines(&out, ':'))
    }

    /// Running domains, id to name.
    pub fn running_instances(&self) -> Result<BTreeMap<u32, String>> {
        let out = self.runner.run(VIRSH, &["list", "--state-running"])?;
        Ok(parse::running_domains(&out))
    }

    /// CPU accounting for one domain, stamped with `timestamp_unix_us`.
    pub fn cpu_snapshot(&self, instance_id: u32, timestamp_unix_us: u64) -> Result<InstanceCpuSnapshot> {
        let id = instance_id.to_string();
        let out = self.runner.run(VIRSH, &["domstats", &id])?;
        InstanceCpuSnapshot::from_stats(instance_id, timestamp_unix_us, &parse::key_value_lines(&out, '='))
    }

    /// Snapshots for every listed domain. A domain whose stats cannot be
    /// fetched or parsed is left out of `taken` and reported in `skipped`.
    pub fn cpu_snapshots(&self, instances: &BTreeMap<u32, String>, clock: fn() -> u64) -> CpuSnapshots {
        let mut out = CpuSnapshots {
            taken: HashMap::with_capacity(instances.len()),
            skipped: Vec::new(),
        };
        for (&id, name) in instances {
            match self.cpu_snapshot(id, clock()) {
                Ok(snap) => {
                    out.taken.insert(id, snap);
                }
                Err(e) => {
                    warn!("skipping domain {id} ({name}): {e}");
                    out.skipped.push(id);
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Aggregate sensors
    // -----------------------------------------------------------------------

    /// Whole-host power draw in watts.
    pub fn host_power(&self) -> Result<f64> {
        let out = self
            .runner
            .run(IPMI_DCMI, &["--get-system-power-statistics"])?;
        let block = parse::key_value_lines(&out, ':');
        let reading = block
            .get("Current Power")
            .ok_or_else(|| SamplerError::missing("Current Power", IPMI_DCMI))?;
        parse::leading_number("Current Power", reading)
    }

    /// Mean power draw across GPUs, in watts.
    pub fn gpu_power(&self) -> Result<f64> {
        let out = self.runner.run(NVIDIA_SMI, &["-q", "-d", "POWER"])?;
        let draws = parse::colon_blocks(&out)
            .iter()
            .filter_map(|block| block.get("Power Draw"))
            .map(|reading| parse::leading_number("Power Draw", reading))
            .collect::<Result<Vec<f64>>>()?;
        debug!("gpu power: {} device(s)", draws.len());
        parse::mean(&draws, "gpu.power")
    }

    /// Mean per-core frequency in GHz over the configured window.
    pub fn avg_cpu_frequency(&self) -> Result<f64> {
        let window = self.config.frequency_window_secs.to_string();
        let out = self.runner.run(CPUFREQ_APERF, &["-o", "-i", &window])?;
        let cores = parse::core_frequencies(&out)?;
        let values: Vec<f64> = cores.into_values().collect();
        parse::mean(&values, "average.cpu.frequency")
    }

    /// Mean of the CPU temperature sensors in degrees C.
    pub fn avg_cpu_temperature(&self) -> Result<f64> {
        let out = self.runner.run(
            IPMITOOL,
            &["sdr", "type", &self.config.temperature_sensor_type],
        )?;
        let readings = parse::cpu_temperatures(&out)?;
        parse::mean(&readings, "average.cpu.temperature")
    }
}
