//! Unix socket server for resolution queries.
//!
//! Speaks newline-delimited JSON so a host DNS framework (or an operator with
//! `slotname-query`) can ask the responder about a name:
//!
//! ```text
//! → {"cmd":"resolve","name":"worker1.tf.local.","record_type":"A"}
//! ← {"status":"answer","records":[{"name":"worker1.tf.local.","class":1,"ttl":0,"type":"A","address":"10.0.0.5"}]}
//! → {"cmd":"resolve","name":"other.example.","record_type":"A"}
//! ← {"status":"pass_through"}
//! ```

use crate::error::Result;
use crate::node::{NodeStatus, StatusHandle};
use crate::responder::{AddressRecord, Answer, QueryResponder, RecordType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ResolveCommand {
    /// Resolve a name
    Resolve {
        name: String,
        #[serde(default = "default_record_type")]
        record_type: String,
    },
    /// Report this node's slot and keeper state
    Status,
    /// Ping (health check)
    Ping,
}

fn default_record_type() -> String {
    "A".to_string()
}

/// Response to a command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveResponse {
    Answer { records: Vec<AddressRecord> },
    PassThrough,
    Status(NodeStatus),
    Error { error: String },
    Pong,
}

/// Resolve socket server.
pub struct ResolveSocket {
    responder: QueryResponder,
    socket_path: PathBuf,
    status: Option<StatusHandle>,
}

impl ResolveSocket {
    pub fn new(responder: QueryResponder, socket_path: impl AsRef<Path>) -> Self {
        Self {
            responder,
            socket_path: socket_path.as_ref().to_path_buf(),
            status: None,
        }
    }

    /// Attach the node's status so `status` commands can be answered.
    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = Some(status);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until `cancel` fires, then remove the socket file.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        // Remove a stale socket left by a previous run
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Resolve socket listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let responder = self.responder.clone();
                        let status = self.status.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, responder, status).await {
                                tracing::error!("Resolve connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept resolve connection: {}", e);
                    }
                },
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        tracing::info!("Resolve socket closed");
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    responder: QueryResponder,
    status: Option<StatusHandle>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<ResolveCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &responder, status.as_ref()).await,
            Err(e) => ResolveResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(
    cmd: ResolveCommand,
    responder: &QueryResponder,
    status: Option<&StatusHandle>,
) -> ResolveResponse {
    match cmd {
        ResolveCommand::Resolve { name, record_type } => {
            let record_type = match record_type.parse::<RecordType>() {
                Ok(t) => t,
                Err(never) => match never {},
            };
            match responder.answer(&name, record_type).await {
                Answer::Records(records) => ResolveResponse::Answer { records },
                Answer::PassThrough => ResolveResponse::PassThrough,
            }
        }

        ResolveCommand::Status => match status {
            Some(handle) => ResolveResponse::Status(handle.snapshot()),
            None => ResolveResponse::Error {
                error: "node status not available".into(),
            },
        },

        ResolveCommand::Ping => ResolveResponse::Pong,
    }
}
