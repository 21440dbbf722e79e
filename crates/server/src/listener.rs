//! Unix-socket listener
//!
//! One tokio task per connection. Each task reads frames, hands append
//! requests to the shared [`DiskRegistry`] and writes one reply per frame.
//! The registry never blocks on I/O, so tasks can call it directly.

use crate::protocol::{read_frame, FrameError, Reply, Request, KIND_APPEND};
use mfdlog_engine::DiskRegistry;
use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Bound socket plus the registry its connections feed
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
    registry: Arc<DiskRegistry>,
}

impl Listener {
    /// Bind `path` with permissions `mode`
    ///
    /// A socket file left by a previous run is removed first. Must be called
    /// inside a tokio runtime.
    pub fn bind(path: &Path, mode: u32, registry: Arc<DiskRegistry>) -> io::Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        info!(path = %path.display(), mode = %format!("{:o}", mode), "listening");
        Ok(Listener {
            listener,
            path: path.to_path_buf(),
            registry,
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` completes, then remove the socket
    ///
    /// Connections already open keep their tasks; their appends are
    /// rejected once the registry shuts down.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(async move {
                            match serve_connection(stream, registry).await {
                                Ok(frames) => debug!(frames, "connection closed"),
                                Err(e) => warn!(error = %e, "connection dropped"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        info!(path = %self.path.display(), "listener stopped");
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove socket");
        }
        Ok(())
    }
}

/// Serve one connection until the peer closes it
///
/// Returns the number of frames answered.
pub async fn serve_connection(
    mut stream: UnixStream,
    registry: Arc<DiskRegistry>,
) -> Result<u64, FrameError> {
    let mut buf = Vec::new();
    let mut frames = 0;
    while read_frame(&mut stream, &mut buf).await? {
        let request = Request::decode(&buf)?;
        let accepted = request.kind == KIND_APPEND
            && request
                .path()
                .map(|path| registry.append_path(path))
                .unwrap_or(false);
        let reply = Reply {
            seq: request.seq,
            accepted,
        };
        stream.write_all(&reply.encode()).await?;
        frames += 1;
    }
    Ok(frames)
}
