//! `hyperembed` command-line trainer.
//!
//! ```bash
//! # Similarity pairs, 10-dimensional Poincaré disk
//! RUST_LOG=info hyperembed --similarity --symmetric -i pairs.csv -o out/model -d 10
//!
//! # Pre-trained vectors on the hyperboloid, continuing a previous run
//! hyperembed -i words.vec -o out/words -m lorentz --resume
//! ```

use clap::Parser;
use hyperembed::cli::{run, Cli};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => {
            info!(
                epochs = report.epochs,
                steps = report.steps,
                loss = report.final_loss,
                stopped_early = report.stopped_early,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
