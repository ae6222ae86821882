use std::path::PathBuf;

use clap::{Parser, Subcommand};

use routeforge::config::{load_config, Settings};
use routeforge::datasource::{BasicAuth, DataSourceConfig, DataSourceType};
use routeforge::generator::PublishOutcome;
use routeforge::lifecycle::Engine;
use routeforge::observability::logging;

#[derive(Parser)]
#[command(name = "routeforge-ctl")]
#[command(about = "One-shot operations against the routeforge store and data sources", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "routeforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the dynamic configuration once
    Generate {
        /// Print the document instead of publishing it
        #[arg(long)]
        print: bool,
    },
    /// Reconcile resources against the active data source once
    SyncResources,
    /// Reconcile services against the active data source once
    SyncServices,
    /// Manage data sources
    #[command(subcommand)]
    Datasource(DatasourceCommands),
}

#[derive(Subcommand)]
enum DatasourceCommands {
    /// List configured data sources
    List,
    /// Make a configured data source active
    Activate { name: String },
    /// Create or replace a data source
    Set {
        name: String,
        /// gateway or proxy-api
        #[arg(long = "type")]
        kind: DataSourceType,
        #[arg(long)]
        url: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings: Settings = load_config(&cli.config)?;
    logging::init_logging(&settings.logging);

    let engine = Engine::build(settings).await?;

    match cli.command {
        Commands::Generate { print } => {
            let mut generator = engine.generator();
            if print {
                print!("{}", generator.render().await?.to_yaml()?);
            } else {
                match generator.generate().await? {
                    PublishOutcome::Written => println!("written"),
                    PublishOutcome::Unchanged => println!("unchanged"),
                }
            }
        }
        Commands::SyncResources => {
            let report = engine.resource_watcher().sync().await?;
            println!(
                "inserted={} updated={} reactivated={} unchanged={} disabled={} active={}",
                report.inserted,
                report.updated,
                report.reactivated,
                report.unchanged,
                report.disabled.len(),
                report.active
            );
            for id in report.disabled {
                println!("disabled {}", id);
            }
        }
        Commands::SyncServices => {
            let report = engine.service_watcher().sync().await?;
            println!(
                "created={} updated={} unchanged={} missing={}",
                report.created,
                report.updated,
                report.unchanged,
                report.missing.len()
            );
            for id in report.missing {
                println!("missing {}", id);
            }
        }
        Commands::Datasource(command) => {
            let datasources = engine.datasources();
            match command {
                DatasourceCommands::List => {
                    let active = datasources.active_name();
                    for (name, config) in datasources.list() {
                        let marker = if name == active { "*" } else { " " };
                        println!("{} {:<12} {:<10} {}", marker, name, config.kind.as_str(), config.url);
                    }
                }
                DatasourceCommands::Activate { name } => {
                    datasources.set_active(&name).await?;
                    println!("active data source: {}", name);
                }
                DatasourceCommands::Set {
                    name,
                    kind,
                    url,
                    username,
                    password,
                } => {
                    let mut config = DataSourceConfig::new(kind, url);
                    if let Some(username) = username {
                        config.basic_auth = Some(BasicAuth {
                            username,
                            password: password.unwrap_or_default(),
                        });
                    }
                    let reachable = datasources.update_and_check(&name, config).await?;
                    println!(
                        "saved {} ({})",
                        name,
                        if reachable { "reachable" } else { "unreachable" }
                    );
                }
            }
        }
    }

    Ok(())
}
