//! Command dispatch for the `verso` binary.

/// Clap argument definitions
mod args;

/// `config show` / `config init`
mod config;

/// `doc` commands over a file-backed repo
mod doc;

/// `id encode` / `id decode`
mod id;

use clap::Parser;

use verso_core::config::Config;

pub use args::Cli;
use args::Commands;

/// Main entry point for the CLI
pub fn run_cli() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let success = match cli.command {
        Commands::Id { command } => id::handle_id_command(command),

        Commands::Config { command } => config::handle_config_command(command, cli.data_dir),

        Commands::Doc { command } => {
            let config = match Config::load() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("✗ Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };
            let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir.clone());
            match doc::open_repo(&data_dir, &config) {
                Ok(repo) => doc::handle_doc_command(command, &repo, config.target_schema_version),
                Err(e) => {
                    eprintln!("✗ Cannot open {}: {}", data_dir.display(), e);
                    false
                }
            }
        }
    };

    if !success {
        std::process::exit(1);
    }
}
