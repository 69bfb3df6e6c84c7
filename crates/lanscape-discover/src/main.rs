//! CLI entry point for the lanscape-discover subnet scanner.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use lanscape_core::TopologyView;
use tracing_subscriber::{fmt, EnvFilter};

use lanscape_discover::api::{self, AppState};
use lanscape_discover::config::{discover_config, graph_config, load_settings};
use lanscape_discover::local;
use lanscape_discover::persist::StoreSink;

#[derive(Parser)]
#[command(name = "lanscape-discover")]
#[command(about = "Subnet host discovery and port scanning for the lanscape topology map")]
struct Cli {
    /// Config file prefix (default: lanscape).
    #[arg(short, long, default_value = "lanscape", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan one subnet and persist the result.
    Scan {
        /// CIDR (e.g. 192.168.1.0/24) or a single address. Defaults to the
        /// subnet of this host's first active interface.
        #[arg(short, long)]
        target: Option<String>,

        /// Scan only; do not write to the stores.
        #[arg(long)]
        no_persist: bool,

        /// Print the full report and its topology view as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP API.
    Serve {
        /// Overrides `discover.listen_addr`.
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Print the stored topology as JSON.
    Topology,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    let discover = discover_config(&settings)?;
    let graph = graph_config(&settings);

    match cli.command {
        Command::Scan {
            target,
            no_persist,
            json,
        } => {
            let target = match target {
                Some(target) => target,
                None => local::detect()?.cidr(),
            };
            let scanner = discover.build_scanner()?;
            let report = if no_persist {
                scanner.scan(&target).await?
            } else {
                let sink = StoreSink::connect(
                    &graph,
                    &discover.document_dir,
                    discover.effective_local_address(),
                )
                .await?;
                tracing::info!("Connected to stores");
                scanner.scan_and_persist(&target, &sink).await?
            };

            if json {
                let output = serde_json::json!({
                    "report": report,
                    "topology": TopologyView::from_report(&report),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!(
                    "{}: {} used, {} available ({:.2}% available), {} open ports",
                    report.subnet.cidr,
                    report.used_count(),
                    report.available_count(),
                    report.available_percentage(),
                    report.open_port_count()
                );
            }
        }
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| discover.listen_addr.clone());
            let state = Arc::new(AppState { discover, graph });
            api::serve(state, &listen).await?;
        }
        Command::Topology => {
            let sink =
                StoreSink::connect(&graph, &discover.document_dir, discover.local_address).await?;
            let view = sink.load_topology().await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
