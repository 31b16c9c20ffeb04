use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vt_cli::commands::{aggregate, import, show, status, top, watch};
use vt_cli::store::open_database;
use vt_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Watch(args) => watch::run(args, &config)?,
        Commands::Aggregate(args) => aggregate::run(&mut stdout, args, &config)?,
        Commands::Import => {
            let mut db = open_database(&config)?;
            import::run(io::stdin().lock(), &mut stdout, &mut db)?;
        }
        Commands::Top(args) => top::run(&mut stdout, args, &config)?,
        Commands::Show(args) => show::run(&mut stdout, args, &config)?,
        Commands::Status => status::run(&mut stdout, &config)?,
    }

    Ok(())
}
