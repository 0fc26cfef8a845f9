//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;
use tracing::debug;

use resfill_core::models::config::PipelineConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Print one value (e.g. "retry.max_retries")
    Get {
        key: String,
    },

    /// Change one value in the configuration file
    Set {
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => {
            if !path.exists() {
                println!(
                    "{} No config file at {}, showing defaults.",
                    style("ℹ").blue(),
                    path.display()
                );
            }
            println!("{}", serde_json::to_string_pretty(&load_or_default(&path)?)?);
            Ok(())
        }
        ConfigCommand::Init(init) => init_config(init.output.unwrap_or(path), init.force),
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(load_or_default(&path)?)?;
            let value = json
                .pointer(&pointer(&key))
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value),
        ConfigCommand::Path => {
            println!("Configuration file: {}", path.display());
            if path.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created").yellow());
                println!();
                println!("Run 'resfill config init' to create a configuration file.");
            }
            Ok(())
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resfill")
        .join("config.json")
}

/// Configuration from `path` (or the default location) when the file
/// exists, defaults otherwise. An explicit path that does not exist is an
/// error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        return Ok(PipelineConfig::from_file(&path)?);
    }
    if explicit {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Ok(PipelineConfig::default())
}

fn load_or_default(path: &Path) -> anyhow::Result<PipelineConfig> {
    if path.exists() {
        Ok(PipelineConfig::from_file(path)?)
    } else {
        Ok(PipelineConfig::default())
    }
}

/// JSON pointer for a dotted key.
fn pointer(key: &str) -> String {
    key.split('.').fold(String::new(), |mut acc, part| {
        acc.push('/');
        acc.push_str(part);
        acc
    })
}

fn init_config(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    PipelineConfig::default().save(&path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

fn set_config(path: &Path, key: &str, raw: &str) -> anyhow::Result<()> {
    let mut json = serde_json::to_value(load_or_default(path)?)?;
    let value: Value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let slot = json
        .pointer_mut(&pointer(key))
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    *slot = value.clone();

    let config: PipelineConfig = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer() {
        assert_eq!(pointer("retry.max_retries"), "/retry/max_retries");
        assert_eq!(pointer("batch"), "/batch");
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        set_config(&path, "batch.jobs", "8").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().batch.jobs, 8);

        assert!(set_config(&path, "batch.jobs", "many").is_err());
        assert!(set_config(&path, "batch.unknown", "1").is_err());
    }
}
