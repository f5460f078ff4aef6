//! CLI for vmpower — sample host power sensors and per-VM CPU share.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vmpower")]
#[command(about = "vmpower — host power sensors and per-VM CPU attribution")]
#[command(version = vmpower_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sampling cycles and print the emitted metrics
    Sample {
        /// Number of cycles (utilization needs at least 2)
        #[arg(long, default_value = "2")]
        cycles: u32,

        /// Seconds between cycles
        #[arg(long, default_value = "5")]
        interval_sec: f64,

        /// JSON config file
        #[arg(long)]
        config: Option<String>,

        /// Compute driver tag (overrides config)
        #[arg(long)]
        driver: Option<String>,

        /// Skip the GPU power sensor
        #[arg(long)]
        no_gpu: bool,

        /// Write the last sample as JSON to path
        #[arg(long)]
        output: Option<String>,
    },

    /// Report which external sensor tools are installed
    Tools,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Sample {
            cycles,
            interval_sec,
            config,
            driver,
            no_gpu,
            output,
        } => commands::sample::run(commands::sample::SampleCommandConfig {
            cycles,
            interval_sec,
            config_path: config.as_deref(),
            driver: driver.as_deref(),
            no_gpu,
            output_path: output.as_deref(),
        }),
        Commands::Tools => commands::tools::run(),
    }
}
