//! Entry point for cmip6-fetch.
//! Parses the CLI, loads settings and the catalog, and runs the download loop.

use clap::Parser;
use cmip6_fetch::cli::Args;
use cmip6_fetch::prelude::*;
use log::{error, info};
use std::process::ExitCode;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .init();
}

fn run(args: &Args) -> Result<RunSummary> {
    ParallelConfig::new(args.threads).setup_global_pool()?;

    let settings = Settings::from_path(&args.settings)?;
    info!("✅ Loaded settings from {}", args.settings.display());

    let catalog = Catalog::load(&settings.metadata_source())?;
    let options = RunOptions {
        dry_run: args.dry_run,
        fail_fast: args.fail_fast,
    };
    Pipeline::new(&settings, &catalog, ZarrOpener, options).run()
}

fn main() -> ExitCode {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    info!(
        r#"
------------------------------------------------------------------
                 CMIP6 cloud catalog downloader
------------------------------------------------------------------"#
    );

    match run(&args) {
        Ok(summary) => {
            summary.log();
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
