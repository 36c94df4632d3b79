mod terminal;

use anyhow::Result;
use batch_logging::{batch_error, batch_info, level_for_verbosity};
use clap::Parser;
use mediabatch_app::cli::Args;
use mediabatch_app::config::{AppConfig, Settings};

fn main() -> Result<()> {
    let args = Args::parse();
    terminal::logging::initialize(args.log, level_for_verbosity(args.verbose));
    batch_info!("mediabatch {} starting", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::discover(args.config.as_deref())?;
    if args.print_config {
        println!("{}", config.to_ron()?);
        return Ok(());
    }
    let settings = Settings::resolve(&args, config)?;

    let result = terminal::run(settings);
    if let Err(err) = &result {
        batch_error!("Exiting with error: {:#}", err);
    }
    result
}
