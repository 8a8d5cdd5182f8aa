//! Echo gRPC Server
//!
//! Runs the replay provisioner as a gRPC server, and inspects packed
//! response archives.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use echo::{EntryName, Operation};
use echo_grpc::{EchoServer, Source};

/// Echo gRPC Server - replays recorded provisioner responses
#[derive(Parser, Debug)]
#[command(name = "echo-grpc")]
#[command(about = "gRPC server replaying recorded provisioner responses")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve recorded responses over gRPC
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "[::1]:50051")]
        addr: SocketAddr,
        /// Resolve request directories beneath this directory
        #[arg(long, conflicts_with = "archive")]
        root: Option<PathBuf>,
        /// Serve a packed archive from memory instead of the filesystem
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Request directory the archive's entries appear under
        #[arg(long, default_value = "/", requires = "archive")]
        mount: String,
    },
    /// List the recorded responses in a packed archive
    Inspect {
        /// Archive file to read
        archive: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct EntrySummary {
    name: String,
    operation: Option<Operation>,
    transition: Option<&'static str>,
    index: Option<usize>,
    size: usize,
}

/// One line of the `inspect` table: name, operation, transition, index, size.
fn table_row(summary: &EntrySummary) -> String {
    let operation = summary
        .operation
        .map_or_else(|| "?".to_string(), |op| op.to_string());
    let index = summary
        .index
        .map_or_else(|| "-".to_string(), |i| i.to_string());
    format!(
        "{:<48} {:<16} {:<8} {:>5} {:>8}",
        summary.name,
        operation,
        summary.transition.unwrap_or("-"),
        index,
        summary.size
    )
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let archive =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let entries = echo::entries(&archive).context("failed to read archive")?;

    let summaries: Vec<EntrySummary> = entries
        .iter()
        .map(|entry| {
            let parsed = entry.name.parse::<EntryName>().ok();
            EntrySummary {
                name: entry.name.clone(),
                operation: parsed.map(|n| n.operation),
                transition: parsed
                    .and_then(|n| n.transition)
                    .map(|t| t.as_str_name()),
                index: parsed.map(|n| n.index),
                size: entry.data.len(),
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in &summaries {
        println!("{}", table_row(summary));
    }
    // Still validate the whole set so broken archives are reported.
    echo::unpack(&archive).context("archive is not a valid response set")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            addr,
            root,
            archive,
            mount,
        } => {
            let source = match archive {
                Some(path) => Source::Archive { path, mount },
                None => Source::Filesystem { root },
            };
            EchoServer::new(addr, source)
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Command::Inspect { archive, json } => inspect(&archive, json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_show_the_index() {
        let row = table_row(&EntrySummary {
            name: "2.stop.provision.plan.protobuf".to_string(),
            operation: Some(Operation::Plan),
            transition: Some("STOP"),
            index: Some(2),
            size: 14,
        });
        let columns: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(
            columns,
            vec!["2.stop.provision.plan.protobuf", "provision.plan", "STOP", "2", "14"]
        );

        let row = table_row(&EntrySummary {
            name: "main.tf".to_string(),
            operation: None,
            transition: None,
            index: None,
            size: 3,
        });
        let columns: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(columns, vec!["main.tf", "?", "-", "-", "3"]);
    }
}
