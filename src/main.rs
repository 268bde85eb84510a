use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use sales_etl::{config::DEFAULT_CONFIG_PATH, pipeline, telemetry, Settings};

/// Extract the raw sales file, derive revenue and write a timestamped copy.
#[derive(Parser)]
#[command(name = "sales-etl", version, about)]
struct Cli {
    /// Project root that every configured path is relative to
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Configuration file, relative to the project root
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli.root, &cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    let _guard = match telemetry::init(&settings) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: could not set up logging: {err}");
            return ExitCode::from(2);
        }
    };

    match pipeline::run(&settings) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
