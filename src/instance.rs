//! Single-instance guard.
//!
//! The first process binds a Unix socket in the runtime dir and becomes the
//! primary. Later processes connect, write their activation URL as one line,
//! and exit. Forwarded URLs arrive on the primary's channel; the primary
//! reports each one with [`ignored_activation`] instead of starting a second
//! session.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Notice;

pub enum InstanceRole {
    /// This process owns the socket.
    Primary(InstanceGuard),
    /// Another process is running; the activation was handed to it.
    Secondary,
}

/// Held by the primary. Dropping it stops the listener and removes the socket.
pub struct InstanceGuard {
    socket_path: PathBuf,
    forwarded: mpsc::UnboundedReceiver<String>,
    accept_task: JoinHandle<()>,
}

impl InstanceGuard {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Next activation URL forwarded by a duplicate launch.
    pub async fn next_forwarded(&mut self) -> Option<String> {
        self.forwarded.recv().await
    }
}

/// Notice for an activation that arrived while another one was running.
pub fn ignored_activation(url: &str) -> Notice {
    Notice::new(
        "Another request is already in progress",
        format!("{url} was ignored. Open it again once the current request has finished."),
    )
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.socket_path.display(), error = %e, "failed to remove instance socket");
            }
        }
    }
}

/// Become the primary instance, or forward `activation` to the running one.
pub async fn acquire(socket_path: &Path, activation: Option<&str>) -> io::Result<InstanceRole> {
    match UnixListener::bind(socket_path) {
        Ok(listener) => return Ok(InstanceRole::Primary(listen(socket_path, listener))),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {}
        Err(e) => return Err(e),
    }

    match UnixStream::connect(socket_path).await {
        Ok(mut stream) => {
            if let Some(url) = activation {
                stream.write_all(url.as_bytes()).await?;
                stream.write_all(b"\n").await?;
            }
            stream.shutdown().await?;
            info!(path = %socket_path.display(), "another instance is running, activation forwarded");
            Ok(InstanceRole::Secondary)
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            debug!(path = %socket_path.display(), "removing stale instance socket");
            std::fs::remove_file(socket_path)?;
            let listener = UnixListener::bind(socket_path)?;
            Ok(InstanceRole::Primary(listen(socket_path, listener)))
        }
        Err(e) => Err(e),
    }
}

fn listen(socket_path: &Path, listener: UnixListener) -> InstanceGuard {
    let (tx, rx) = mpsc::unbounded_channel();
    let accept_task = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "instance socket accept failed");
                    continue;
                }
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    info!(url = %line, "activation forwarded by another launch");
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
    });

    InstanceGuard {
        socket_path: socket_path.to_path_buf(),
        forwarded: rx,
        accept_task,
    }
}
