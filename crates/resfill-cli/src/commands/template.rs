//! Template command - create and check the spreadsheet template.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use resfill_core::template::{self, LAYOUT_V1};

use super::config::load_config;

/// Arguments for the template command.
#[derive(Args)]
pub struct TemplateArgs {
    #[command(subcommand)]
    command: TemplateCommand,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Write a blank layout-v1 template
    Init {
        /// Output path (default: the configured template path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Check a template against the expected layout
    Check {
        /// Template path (default: the configured template path)
        path: Option<PathBuf>,
    },
}

pub fn run(args: TemplateArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    match args.command {
        TemplateCommand::Init { output, force } => {
            let path = output.unwrap_or(config.template.path);
            if path.exists() && !force {
                anyhow::bail!(
                    "Template already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            template::write_default_template(&path)?;
            println!(
                "{} Created layout v{} template at {}",
                style("✓").green(),
                LAYOUT_V1.version,
                path.display()
            );
        }
        TemplateCommand::Check { path } => {
            let path = path.unwrap_or(config.template.path);
            template::preflight(&path)?;
            println!(
                "{} {} matches layout v{}",
                style("✓").green(),
                path.display(),
                LAYOUT_V1.version
            );
        }
    }

    Ok(())
}
