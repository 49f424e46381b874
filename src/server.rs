//! Socket server for XHDR clients
//!
//! One task per connection. A connection handles one request at a time:
//! read a full request, dispatch it, write the reply, then read the next.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use xhdr_proto::wire::{RequestHeader, REQUEST_HEADER_SIZE};

use crate::dispatch::Dispatcher;
use crate::resolver::ClientIdentity;

/// Listening side of the extension
pub struct XhdrServer {
    dispatcher: Arc<Dispatcher>,
    socket_path: PathBuf,
}

impl XhdrServer {
    pub fn new(dispatcher: Arc<Dispatcher>, socket_path: PathBuf) -> Self {
        Self {
            dispatcher,
            socket_path,
        }
    }

    /// Bind the socket and start accepting (spawns a background task)
    pub async fn start(self) -> Result<ServerHandle> {
        // Remove existing socket if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove stale socket")?;
        }

        // Create parent directory if needed
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind {:?}", self.socket_path))?;
        info!("XHDR server listening on {:?}", self.socket_path);

        let dispatcher = self.dispatcher;
        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(handle_client(stream, dispatcher));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(ServerHandle {
            socket_path: self.socket_path,
            acceptor,
        })
    }
}

/// Handle for a running server
pub struct ServerHandle {
    socket_path: PathBuf,
    acceptor: JoinHandle<()>,
}

impl ServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting and remove the socket file
    pub fn shutdown(self) {
        self.acceptor.abort();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("Failed to remove socket {:?}: {}", self.socket_path, e);
        }
        info!("XHDR server stopped");
    }
}

/// Handle a connected client
async fn handle_client(stream: UnixStream, dispatcher: Arc<Dispatcher>) {
    let identity = match stream.peer_cred() {
        Ok(cred) => ClientIdentity {
            uid: cred.uid(),
            pid: cred.pid(),
        },
        Err(e) => {
            warn!("Rejecting client without peer credentials: {}", e);
            return;
        }
    };
    info!("Client connected (uid {}, pid {:?})", identity.uid, identity.pid);

    match serve_connection(stream, identity, &dispatcher).await {
        Ok(()) => info!("Client disconnected (uid {})", identity.uid),
        Err(e) => debug!("Client connection ended: {}", e),
    }
}

/// Serve requests from one connection until it closes
///
/// Returns `Ok(())` on a clean close between requests.
pub async fn serve_connection<S>(
    mut stream: S,
    identity: ClientIdentity,
    dispatcher: &Dispatcher,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; REQUEST_HEADER_SIZE];
    loop {
        // Read request header
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let Some(parsed) = RequestHeader::decode(&header) else {
            return Ok(());
        };

        let declared = parsed.byte_len();
        let mut request = header.to_vec();
        if declared > REQUEST_HEADER_SIZE {
            request.resize(declared, 0);
            stream.read_exact(&mut request[REQUEST_HEADER_SIZE..]).await?;
        }

        let reply = dispatcher.dispatch(&request, &identity).await;
        stream.write_all(&reply).await?;
        stream.flush().await?;

        if declared < REQUEST_HEADER_SIZE {
            // a length that can't cover its own header leaves no way to find
            // the next request
            warn!(
                "Closing connection from uid {}: request length {} units",
                identity.uid, parsed.length
            );
            return Ok(());
        }
    }
}
