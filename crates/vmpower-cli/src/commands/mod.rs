pub mod sample;
pub mod tools;

use std::path::Path;

use vmpower_core::SamplerConfig;

/// Load the config file if given, then apply flag overrides.
pub fn load_config(path: Option<&str>, driver: Option<&str>, no_gpu: bool) -> SamplerConfig {
    let mut config = match path {
        Some(p) => match SamplerConfig::load(Path::new(p)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        None => SamplerConfig::default(),
    };
    if let Some(d) = driver {
        config.compute_driver = d.to_string();
    }
    if no_gpu {
        config.gpu_enabled = false;
    }
    config
}

/// Serialize `value` as pretty JSON to `path`, reporting the outcome.
pub fn write_json<T: serde::Serialize>(value: &T, path: &str, label: &str) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(path, json) {
            Ok(()) => println!("\n{label} written to {path}"),
            Err(e) => eprintln!("Failed to write {path}: {e}"),
        },
        Err(e) => eprintln!("Failed to serialize {label}: {e}"),
    }
}
