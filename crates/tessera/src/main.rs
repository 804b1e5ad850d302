// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tessera - consumer registry, lifecycle and cascading delete service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tessera_config::TesseraConfig;

/// Tessera - consumer registry, lifecycle and cascading delete service.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about, long_about = None)]
struct Cli {
    /// Load this file instead of the default configuration hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the consumer service until interrupted.
    Serve,
    /// Print the resolved configuration as TOML.
    Config,
}

fn load(path: Option<&PathBuf>) -> TesseraConfig {
    let loaded = match path {
        Some(path) => tessera_config::load_and_validate_path(path),
        None => tessera_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tessera_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    match cli.command {
        Some(Commands::Serve) => {
            let shutdown = shutdown::install_signal_handler();
            if let Err(e) = serve::run_serve(config, shutdown).await {
                eprintln!("tessera: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("tessera: cannot render configuration: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("tessera: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_config_flag() {
        let cli = Cli::parse_from(["tessera", "serve", "--config", "/tmp/t.toml"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = tessera_config::load_config_from_str("").expect("defaults should load");
        let rendered = toml::to_string_pretty(&config).expect("should render");
        assert!(rendered.contains("data_source_name = \"db_sop\""));
        assert!(rendered.contains("duplicate_policy = \"replace\""));
    }
}
