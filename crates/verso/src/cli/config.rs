//! Config command handlers

use std::path::PathBuf;

use verso_core::config::Config;

use crate::cli::args::ConfigCommands;

pub fn handle_config_command(command: Option<ConfigCommands>, data_dir: Option<PathBuf>) -> bool {
    match command {
        None | Some(ConfigCommands::Show) => show_config(),
        Some(ConfigCommands::Init) => init_config(data_dir),
    }
}

/// Show the effective configuration
fn show_config() -> bool {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load config: {}", e);
            return false;
        }
    };

    println!("Verso Configuration");
    println!("===================");
    for line in describe(&config) {
        println!("{}", line);
    }
    match Config::config_path() {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not written yet)", path.display()),
        None => println!("Config file: unavailable on this platform"),
    }
    true
}

fn init_config(data_dir: Option<PathBuf>) -> bool {
    match Config::init(data_dir) {
        Ok(config) => {
            println!("✓ Wrote default configuration");
            println!("  Data directory: {}", config.data_dir.display());
            if let Some(path) = Config::config_path() {
                println!("  Config file: {}", path.display());
            }
            true
        }
        Err(e) => {
            eprintln!("✗ Failed to write config: {}", e);
            false
        }
    }
}

fn describe(config: &Config) -> Vec<String> {
    let mut lines = vec![format!("Data directory: {}", config.data_dir.display())];
    if let Some(ref name) = config.peer_name {
        lines.push(format!("Peer name: {}", name));
    }
    lines.push(format!("Ephemeral: {}", config.ephemeral));
    if let Some(version) = config.target_schema_version {
        lines.push(format!("Target schema version: {}", version));
    }
    if let Some(ref storage_id) = config.storage_id {
        lines.push(format!("Storage id: {}", storage_id));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_skips_unset_fields() {
        let config = Config::new(PathBuf::from("/data"));
        assert_eq!(
            describe(&config),
            vec!["Data directory: /data".to_string(), "Ephemeral: false".to_string()]
        );
    }

    #[test]
    fn test_describe_lists_set_fields() {
        let mut config = Config::new(PathBuf::from("/data"));
        config.peer_name = Some("desk".into());
        config.target_schema_version = Some(4);
        let lines = describe(&config);
        assert!(lines.contains(&"Peer name: desk".to_string()));
        assert!(lines.contains(&"Target schema version: 4".to_string()));
    }
}
