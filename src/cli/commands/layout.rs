//! Layout command implementation.

use crate::control::store::{FileLayoutStore, LayoutStore};
use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Layout operations.
#[derive(Args, Debug)]
pub struct LayoutArgs {
    #[command(subcommand)]
    pub command: LayoutCommand,
}

/// Layout subcommands.
#[derive(Subcommand, Debug)]
pub enum LayoutCommand {
    /// Show the persisted layout.
    Show {
        /// Layout file; defaults to `paths.layout_file` from the config.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Run the layout command.
pub fn run_layout(args: LayoutArgs, config_path: &Path) -> Result<()> {
    match args.command {
        LayoutCommand::Show { file, format } => {
            let file = match file {
                Some(file) => file,
                None => Config::from_file(config_path)?.paths.layout_file,
            };
            show_layout(&file, &format)
        }
    }
}

fn show_layout(path: &Path, format: &str) -> Result<()> {
    let store = FileLayoutStore::new(path);
    let layout = store
        .load()
        .with_context(|| format!("failed to read layout from {}", path.display()))?
        .with_context(|| format!("no layout persisted at {}", path.display()))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&layout)?),
        "text" => {
            println!("epoch:          {}", layout.epoch);
            println!("layout servers: {}", layout.layout_servers.join(", "));
            println!("sequencers:     {}", layout.sequencers.join(", "));
            for (i, segment) in layout.segments.iter().enumerate() {
                let end = if segment.is_open() {
                    "open".to_string()
                } else {
                    segment.end.get().to_string()
                };
                println!(
                    "segment {i}:      [{}, {end}] on {}",
                    segment.start.get(),
                    segment.log_servers.join(", ")
                );
            }
            if !layout.unresponsive_servers.is_empty() {
                println!("unresponsive:   {}", layout.unresponsive_servers.join(", "));
            }
        }
        other => anyhow::bail!("unknown format {other:?}, expected text or json"),
    }
    Ok(())
}
