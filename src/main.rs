//! `node-agent`: runs the servers defined in a configuration file and takes
//! control requests as newline-delimited JSON on stdin.
//!
//! ```text
//! {"type":"power","server":"<uuid>","action":"start"}
//! {"type":"power","server":"<uuid>","action":"stop","wait_seconds":5}
//! {"type":"command","server":"<uuid>","commands":["say hello"]}
//! {"type":"reinstall","server":"<uuid>"}
//! {"type":"delete","server":"<uuid>"}
//! {"type":"deny","jtis":["<jti>"]}
//! ```

use clap::Parser;
use node_agent::api::{ApiError, PowerRequest};
use node_agent::config::Config;
use node_agent::environment::ProcessEnvironment;
use node_agent::filesystem::LocalFilesystem;
use node_agent::install::ScriptInstaller;
use node_agent::lifecycle::{setup_tracing_with_default, NodeSystem};
use node_agent::remote::StaticRemote;
use node_agent::server::{Server, ServerId, ServerServices};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Instrument};

#[derive(Parser, Debug)]
#[command(name = "node-agent", about = "Runs and controls game servers on this node")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "/etc/node-agent/config.json")]
    config: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlRequest {
    Power {
        server: ServerId,
        #[serde(flatten)]
        request: PowerRequest,
    },
    Command {
        server: ServerId,
        commands: Vec<String>,
    },
    Install {
        server: ServerId,
    },
    Reinstall {
        server: ServerId,
    },
    Delete {
        server: ServerId,
    },
    Deny {
        jtis: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config)?);
    setup_tracing_with_default(&config.log_filter);

    info!(config = %cli.config.display(), servers = config.servers.len(), "Starting node agent");

    let system = NodeSystem::new(config.clone(), Arc::new(ScriptInstaller));
    let remote = Arc::new(StaticRemote::new(config.servers.iter().map(|s| s.config.clone())));

    for definition in &config.servers {
        let id = definition.config.uuid;
        let root = config.server_root(&id);
        let services = ServerServices {
            environment: Arc::new(ProcessEnvironment::new(
                id.to_string(),
                root.clone(),
                definition.stop_command.clone(),
            )),
            filesystem: Arc::new(LocalFilesystem::new(
                root,
                config.disk_check_interval(),
                config.user.uid,
                config.user.gid,
            )),
            remote: remote.clone(),
            config: config.clone(),
        };
        system.manager.add(Server::new(definition.config.clone(), services)).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let request: ControlRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "ignoring malformed control request");
                continue;
            }
        };

        let span = tracing::info_span!("control_request");
        if let Err(e) = handle(&system, request).instrument(span).await {
            error!(status = e.status_code(), error = %e, "control request rejected");
        }
    }

    system.shutdown().await?;
    Ok(())
}

async fn handle(system: &NodeSystem, request: ControlRequest) -> Result<(), ApiError> {
    let handlers = &system.handlers;
    match request {
        ControlRequest::Power { server, request } => {
            let server = handlers.server(server).await?;
            handlers.post_power(&server, request).await?;
        }
        ControlRequest::Command { server, commands } => {
            let server = handlers.server(server).await?;
            handlers.send_commands(&server, commands).await?;
        }
        ControlRequest::Install { server } => {
            let server = handlers.server(server).await?;
            handlers.install(&server).await?;
        }
        ControlRequest::Reinstall { server } => {
            let server = handlers.server(server).await?;
            handlers.reinstall(&server).await?;
        }
        ControlRequest::Delete { server } => {
            handlers.delete_server(server).await?;
        }
        ControlRequest::Deny { jtis } => handlers.deny_tokens(jtis),
    }
    Ok(())
}
