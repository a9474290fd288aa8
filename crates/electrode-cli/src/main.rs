//! Electrode command-line interface.
//!
//! Solve and evaluate voltage patterns from TOML job files:
//! ```sh
//! electrode-cli run job.toml
//! electrode-cli eval job.toml
//! electrode-cli validate job.toml
//! electrode-cli axes
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use electrode_geometry::EulerAxes;

#[derive(Parser)]
#[command(name = "electrode-cli")]
#[command(about = "Surface electrode potentials and voltage pattern solver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve for the free voltages of a job and write the results.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Evaluate the probe points with the configured voltages.
    Eval {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Build the system and formulate the problem without solving.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the supported Euler axis conventions.
    Axes,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Electrode pattern solver");
            println!("========================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;
            for (name, value) in result.problem.names().iter().zip(result.solution.iter()) {
                println!("  {name:>12} = {value:+.6}");
            }
            println!("Objective: {:.6e}", result.objective);

            let probes = runner::evaluate_probes(&job, &result.system);
            if !probes.is_empty() {
                println!("Probes:");
                runner::print_probes(&probes);
            }

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_voltages {
                runner::write_voltages_csv(&result, &out_dir.join("voltages.csv"))?;
            }

            if job.output.save_json {
                runner::write_report_json(&result, probes, &out_dir.join("report.json"))?;
            }

            if let Some(plane) = &job.map {
                let map = result.system.potential_map(plane)?;
                runner::write_potential_map_csv(&map, &out_dir.join("potential_map.csv"))?;
            }

            println!("Solve complete.");
            Ok(())
        }
        Commands::Eval { config } => {
            let job = config::load_config(&config)?;
            let system = runner::build_system(&job)?;
            if job.probes.is_empty() {
                anyhow::bail!("No [[probe]] points in {}", config.display());
            }
            println!("Probes:");
            runner::print_probes(&runner::evaluate_probes(&job, &system));
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let system = runner::build_system(&job)?;
            let problem = runner::formulate(&job, &system)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} electrodes, {} free, {} objective rows, {} bounds",
                system.len(),
                problem.len(),
                problem.rows().len(),
                problem.bounds().len()
            );
            Ok(())
        }
        Commands::Axes => {
            println!("Euler axis conventions (s = static, r = rotating frame):");
            for axes in EulerAxes::all() {
                println!("  {axes}");
            }
            Ok(())
        }
    }
}
