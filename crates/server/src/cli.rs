//! Argument parsing and config loading (`SPEC_FULL.md` §6
//! "Configuration"), mirrored from this codebase's gateway ancestor's
//! `cli/mod.rs`.

use clap::{Parser, Subcommand};

use sf_domain::config::Config;

/// stashforge — an AI-tagging task orchestrator for a Stash library.
#[derive(Debug, Parser)]
#[command(name = "stashforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server. Default when no subcommand is given.
    Serve,
    /// Print the resolved config path and validation issues, then exit.
    CheckConfig,
}

/// Load configuration from the path named by `STASHFORGE_CONFIG`
/// (defaulting to `./config.toml`), falling back to [`Config::default`]
/// when the file doesn't exist. Returns the parsed config and the path
/// it was (or would have been) read from.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let path = std::env::var("STASHFORGE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    let config = if std::path::Path::new(&path).exists() {
        let raw =
            std::fs::read_to_string(&path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, path))
}
