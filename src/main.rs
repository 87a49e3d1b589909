use clap::Parser;
use unitstore::Settings;
use unitstore::cli::commands::{data, init, units};
use unitstore::cli::{Cli, Commands};

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = load_settings(&cli)?;
    unitstore::logging::init_with_config(&settings.logging);

    match &cli.command {
        Commands::Init { force } => init::run_init(*force)?,
        Commands::Config => init::run_config(&settings)?,
        Commands::Units => units::run_units(&settings)?,
        Commands::Put { unit, key, value } => data::run_put(&settings, unit, key, value)?,
        Commands::Get { unit, key } => return data::run_get(&settings, unit, key),
        Commands::Remove { unit, key } => data::run_remove(&settings, unit, key)?,
        Commands::Clean { unit } => data::run_clean(&settings, unit)?,
    }
    Ok(true)
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
