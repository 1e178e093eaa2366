use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use hana_sql_exporter::cli::{Cli, Command};
use hana_sql_exporter::config::{CliOverrides, Config};
use hana_sql_exporter::secrets::EnvSecretStore;
use hana_sql_exporter::tenant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Convert(args) => {
            hana_sql_exporter::convert::convert_file(&args.input, &args.output)?;
            println!("wrote {}", args.output.display());
            Ok(())
        }
        Command::Web(args) => run_web(args).await,
    }
}

async fn run_web(args: hana_sql_exporter::cli::WebArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        timeout: args.timeout,
        ip: args.ip,
        port: args.port,
        log_level: args.log_level,
        log_file: args.log_file,
    };
    let mut config = Config::load(&args.config, &overrides)?;
    if args.component_aware_versions {
        config.component_aware_versions = true;
    }
    config.adapt_schema_filters();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("hana_sql_exporter={},tower_http=info", config.log_level))
        }))
        .init();

    let secrets = EnvSecretStore;
    let connect_timeout = std::time::Duration::from_secs(config.timeout);
    let tenants = tenant::prepare_tenants(&config.tenants, &secrets, connect_timeout).await;
    tracing::info!(count = tenants.len(), "tenants prepared");

    let config = Arc::new(config);
    let tenants = Arc::new(RwLock::new(tenants));

    hana_sql_exporter::web::serve(config, tenants).await
}
