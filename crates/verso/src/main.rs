//! `verso`: inspect and edit a local Verso artifact store.

/// CLI module - argument parsing and command handlers
mod cli;

fn main() {
    cli::run_cli();
}
