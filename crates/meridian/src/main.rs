//! Command-line tools for inspecting Meridian configuration and filters.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, info};
use meridian::config::{LayeredConfigOptions, MeridianConfig};
use meridian::guard::{ContentSanitizer, SanitizerPolicy};
use std::path::PathBuf;

/// Command-line options for the Meridian CLI.
#[derive(Parser)]
#[command(name = "meridian", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective layered config as JSON
    Config {
        /// Directory used to resolve the project and cwd layers
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Runtime override file, applied last (repeatable)
        #[arg(long = "runtime")]
        runtime: Vec<PathBuf>,
    },
    /// Run the content sanitizer over TEXT and print the outcome as JSON
    Sanitize {
        text: String,
        /// Redact dynamic execution and PII instead of flagging them
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> anyhow::Result<()> {
    meridian::init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Config { cwd, runtime } => print_config(cwd, runtime),
        Command::Sanitize { text, strict } => sanitize(&text, strict),
    }
}

fn print_config(cwd: Option<PathBuf>, runtime: Vec<PathBuf>) -> anyhow::Result<()> {
    let cwd = match cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("cwd")?,
    };
    info!(
        "loading layered config (cwd={}, runtime_layers={})",
        cwd.display(),
        runtime.len()
    );
    let options = runtime
        .iter()
        .fold(LayeredConfigOptions::new(&cwd), |options, path| {
            options.with_runtime_path(path)
        });
    let layered = MeridianConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    for layer in &layered.layers {
        debug!(
            "config layer applied (source={:?}, path={})",
            layer.source,
            layer.path.display()
        );
    }
    let rendered =
        serde_json::to_string_pretty(&layered.config).context("failed to render config")?;
    println!("{rendered}");
    Ok(())
}

fn sanitize(text: &str, strict: bool) -> anyhow::Result<()> {
    let policy = if strict {
        SanitizerPolicy::strict()
    } else {
        let cwd = std::env::current_dir().context("cwd")?;
        let layered =
            MeridianConfig::load_layered(&cwd).context("failed to load layered config")?;
        SanitizerPolicy::from_config(&layered.config.sanitizer)
    };
    let sanitizer = ContentSanitizer::new(policy).context("failed to build sanitizer")?;
    let outcome = sanitizer.sanitize(text);
    let rendered = serde_json::to_string_pretty(&outcome).context("failed to render outcome")?;
    println!("{rendered}");
    Ok(())
}
