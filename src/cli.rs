//! Command-line surface (spec.md §6): `web` starts the exporter, `convert`
//! turns a legacy JSON metrics file into this exporter's TOML shape.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hana-sql-exporter", about = "Prometheus exporter for SAP HANA")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts the HTTP exporter.
    Web(WebArgs),
    /// Converts a legacy JSON metrics file into TOML `[[queries]]`.
    Convert(ConvertArgs),
}

#[derive(Debug, Parser)]
pub struct WebArgs {
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub ip: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long = "log-file")]
    pub log_file: Option<String>,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[arg(long = "component-aware-versions")]
    pub component_aware_versions: bool,
}

#[derive(Debug, Parser)]
pub struct ConvertArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
}
