//! `vmpower sample` — run sampling cycles against the local host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use vmpower_core::{MetricRecord, PowerSampler, SensorSample, SystemRunner, publish};

pub struct SampleCommandConfig<'a> {
    pub cycles: u32,
    pub interval_sec: f64,
    pub config_path: Option<&'a str>,
    pub driver: Option<&'a str>,
    pub no_gpu: bool,
    pub output_path: Option<&'a str>,
}

pub fn run(cfg: SampleCommandConfig<'_>) {
    if !cfg.interval_sec.is_finite() || cfg.interval_sec < 0.0 {
        eprintln!(
            "Invalid --interval-sec value: {}. Expected a finite value >= 0.",
            cfg.interval_sec
        );
        std::process::exit(2);
    }
    let interval = Duration::from_secs_f64(cfg.interval_sec.min(86_400.0));

    let config = super::load_config(cfg.config_path, cfg.driver, cfg.no_gpu);
    let runner = SystemRunner::new(config.elevation);
    let mut sampler = PowerSampler::new(config, Box::new(runner));
    println!("Sampling as {}", sampler.identity());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        log::warn!("could not install Ctrl-C handler: {e}");
    }

    let mut last: Option<SensorSample> = None;
    let mut failures = 0u32;
    for cycle in 1..=cfg.cycles {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match sampler.sample() {
            Ok(sample) => {
                print_sample(cycle, &sample);
                last = Some(sample);
            }
            Err(e) => {
                failures += 1;
                eprintln!("\ncycle {cycle}: {e}");
            }
        }
        if cycle < cfg.cycles {
            sleep_while_running(interval, &running);
        }
    }

    if let (Some(path), Some(sample)) = (cfg.output_path, last.as_ref()) {
        super::write_json(sample, path, "Sample");
    }
    if failures > 0 {
        std::process::exit(1);
    }
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let start = Instant::now();
    while running.load(Ordering::SeqCst) && start.elapsed() < total {
        let remaining = total.saturating_sub(start.elapsed());
        std::thread::sleep(remaining.min(Duration::from_millis(100)));
    }
}

fn print_sample(cycle: u32, sample: &SensorSample) {
    println!("\n{:=<68}", "");
    println!(
        "Cycle {cycle}  host: {}  at {}us",
        sample.hostname.as_deref().unwrap_or("unknown"),
        sample.timestamp_unix_us
    );
    println!("{:=<68}", "");

    let mut records: Vec<MetricRecord> = Vec::new();
    publish(sample, &mut records);
    for r in &records {
        println!("  {:<26} {:>10.2} {}", r.name, r.value, r.unit);
    }

    if sample.utilization.is_empty() {
        println!("  utilization: no baseline yet");
    } else {
        println!("  utilization (share of host CPU):");
        for (id, fraction) in &sample.utilization {
            println!("    domain {id:<6} {:>7.2}%", fraction * 100.0);
        }
    }
}
