//! Command-line argument structures and enums

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "verso")]
#[command(version)]
#[command(about = "Inspect and edit a Verso artifact store", long_about = None)]
pub struct Cli {
    /// Override the artifact storage directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert change ids to and from their URL form
    Id {
        #[command(subcommand)]
        command: IdCommands,
    },

    /// Work with stored documents
    #[command(alias = "d")]
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum IdCommands {
    /// Print the URL form of a change id
    /// Accepts a JSON head array, a commit hash, or "uncommitted"
    Encode {
        /// Change id, e.g. '["ab12","cd34"]'
        id: String,
    },

    /// Decode a URL-form change id
    Decode {
        /// URL-encoded change id
        encoded: String,
    },
}

#[derive(Subcommand)]
pub enum DocCommands {
    /// Create a document and print its address
    Create {
        /// JSON file holding the initial content (default: empty object)
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Print a document's content as JSON
    Show {
        /// Document address (doc:<id>)
        address: String,

        /// Show the document as of this change id
        #[arg(long)]
        at: Option<String>,
    },

    /// Print a document's current change id
    Heads {
        /// Document address (doc:<id>)
        address: String,
    },

    /// List stored documents
    #[command(alias = "ls")]
    List,

    /// Delete a stored document
    #[command(alias = "rm")]
    Delete {
        /// Document address (doc:<id>)
        address: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Write a default config file, recording `--data-dir` if given
    Init,
}
