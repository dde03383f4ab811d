//! Change id conversion commands

use verso_core::ChangeId;
use verso_core::error::Result;

use crate::cli::args::IdCommands;

pub fn handle_id_command(command: IdCommands) -> bool {
    match command {
        IdCommands::Encode { id } => match encode(&id) {
            Ok(encoded) => {
                println!("{}", encoded);
                true
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                false
            }
        },
        IdCommands::Decode { encoded } => match ChangeId::from_url_param(&encoded) {
            Ok(id) => {
                println!("{}", id);
                println!("kind: {}", kind_of(&id));
                true
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                false
            }
        },
    }
}

fn encode(input: &str) -> Result<String> {
    let id: ChangeId = input.parse()?;
    Ok(id.url_encode())
}

fn kind_of(id: &ChangeId) -> &'static str {
    if id.is_uncommitted() {
        "uncommitted"
    } else if id.is_head_set() {
        "head-set"
    } else {
        "commit hash"
    }
}
