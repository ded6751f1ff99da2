//! # npbtool - Main Entry Point
//!
//! Wrapper for NAS Parallel Benchmarks that splits initialization time from
//! main kernel runtime, and can run AMD uProf PCM over the main phase only.
//!
//! ## Subcommands
//!
//! - `time --command <path>`: run once and print the phase split and Mop/s
//! - `profile --init_duration <s> --run_duration <s> --command <path>`: load the
//!   `msr` module, run the benchmark, and profile memory bandwidth into
//!   `out/<benchmark>.csv`
//!
//! GPU statistics are better collected with NVIDIA `nsys` and Nsight Systems,
//! where the main kernel segment can be selected on the timeline directly.
//!
//! ## Error Handling
//!
//! Spawn failures, a missing `msr` module, and malformed throughput lines end
//! the run with a non-zero exit status. A benchmark exiting non-zero does not.

use anyhow::Result;
use clap::Parser;
use npb_harness::{
    cli::{Args, Commands},
    logging, Harness, HarnessConfig, ModprobeLoader, ProfilePlan,
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    debug!("Configuration: {:?}", args);

    let harness = Harness::new(HarnessConfig::from(&args));

    let report = match &args.mode {
        Commands::Time { command } => {
            info!("Timing {}", command);
            harness.time(command).await?
        }
        Commands::Profile {
            init_duration,
            run_duration,
            command,
            ..
        } => {
            info!("Profiling {}", command);
            let plan = ProfilePlan {
                init_duration: *init_duration,
                run_duration: *run_duration,
            };
            harness
                .profile(command, plan, &ModprobeLoader::from_config(harness.config()))
                .await?
        }
    };

    println!("{}", report);
    Ok(())
}
