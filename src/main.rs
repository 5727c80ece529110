//! Plinko command line runner
//!
//! Loads a JSON scene, prints its description and the status stream, and
//! writes every raster observer's graymap into the output directory. In the
//! browser the library's worker bindings are used instead.

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;
    use std::process::ExitCode;

    use anyhow::{Context, Result};
    use clap::Parser;

    use plinko::platform::FileSink;
    use plinko::{Halt, Simulation, config::Config};

    #[derive(Debug, Parser)]
    #[command(name = "plinko", version, about = "Run a 2D particle simulation described by a JSON file")]
    pub struct Cli {
        /// Scene description
        pub config: PathBuf,

        /// Directory graymaps are written to
        #[arg(short, long, default_value = ".")]
        pub output_dir: PathBuf,

        /// Override `simulation.max_steps`
        #[arg(long)]
        pub max_steps: Option<u64>,

        /// Do not print the status stream
        #[arg(short, long)]
        pub quiet: bool,
    }

    pub fn run(cli: Cli) -> Result<ExitCode> {
        let json = std::fs::read_to_string(&cli.config)
            .with_context(|| format!("reading {}", cli.config.display()))?;
        let config = Config::from_json(&json).with_context(|| format!("loading {}", cli.config.display()))?;
        let sink = FileSink::new(&cli.output_dir, cli.quiet);
        let mut sim = Simulation::from_config(&config, Box::new(sink))
            .with_context(|| format!("loading {}", cli.config.display()))?;
        if let Some(max_steps) = cli.max_steps {
            sim.set_max_steps(max_steps);
        }

        sim.log_description();
        let result = sim.run();
        if let Some(e) = &result.output_error {
            eprintln!("output error: {e}");
        }
        log::info!("{} steps, t = {:.6}", result.steps, result.time);
        Ok(match result.halt {
            Halt::Error(e) => {
                println!("error: {e}");
                ExitCode::FAILURE
            }
            Halt::Cancelled => {
                println!("cancelled");
                ExitCode::SUCCESS
            }
            Halt::MaxSteps | Halt::Interrupt(_) if result.output_error.is_some() => ExitCode::FAILURE,
            Halt::MaxSteps | Halt::Interrupt(_) => {
                println!("done");
                ExitCode::SUCCESS
            }
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use clap::Parser;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cli::Cli::parse();
    match cli::run(args) {
        Ok(code) => code,
        Err(e) => {
            println!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The worker drives the simulation through the exported bindings
}
