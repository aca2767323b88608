//! Configuration view and validation commands: `sprintboard config`.

use anyhow::{Result, bail};
use sprintboard::config::ClientConfig;

use super::super::ConfigCommands;
use super::load_config;
use crate::Cli;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli.config.clone().or_else(ClientConfig::default_path);
    let config = load_config(cli)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Sprintboard Configuration");
            println!("=========================");
            println!();
            match &config_path {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!("Config file: {} (not found, using defaults)", path.display()),
                None => println!("Config file: (no config directory on this platform)"),
            }
            println!();

            println!("[api]");
            println!("  base_url = \"{}\"", config.api_base());
            println!();

            println!("[realtime]");
            println!("  key = \"{}\"", config.realtime.key);
            match &config.realtime.host {
                Some(host) => println!("  host = \"{}\"", host),
                None => println!("  cluster = \"{}\"", config.realtime.cluster),
            }
            println!("  port = {}", config.realtime.port);
            println!("  tls = {}", config.realtime.tls);
            println!("  auth_endpoint = \"{}\"", config.auth_endpoint());
            println!();

            println!("[storage]");
            println!("  data_dir = \"{}\"", config.data_dir().display());
            println!("  cache_dir = \"{}\"", config.cache_dir().display());
            println!();

            println!("Realtime URL: {}", config.realtime_url());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
                return Ok(());
            }
            println!("Configuration problems:");
            for problem in &problems {
                println!("  - {}", problem);
            }
            bail!("{} configuration problem(s)", problems.len());
        }
    }

    Ok(())
}
