use clap::{Parser, Subcommand};
use overture_extracts_cli::{extract, list_boundaries, Extract, ListBoundaries};

/// CLI for country-scoped Overture Maps extracts
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extracts one Overture type for one or more countries
    Extract(Extract),
    /// Lists the boundaries available in the store
    ListBoundaries(ListBoundaries),
}

#[allow(clippy::print_stderr)]
fn main() {
    let logger = flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(flexi_logger::Logger::start);
    let _logger = match logger {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract(params) => extract(params),
        Commands::ListBoundaries(params) => list_boundaries(params),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
