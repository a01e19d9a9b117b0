//! Listener lifecycle: bind, accept, and session bookkeeping.
//!
//! [`ReplServer`] wraps the shared [`Gateway`] and owns at most one active
//! listen operation at a time. Each accepted connection becomes a session
//! task registered with the server; `stop` tears the accept loop and every
//! session down and returns the server to the startable state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::engine::{EvalEngine, Gateway};
use crate::error::{BridgeError, Result};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::session::run_session;
use crate::writer::DEFAULT_REPLY_QUEUE_CAPACITY;

/// Per-server limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum accepted frame payload size in bytes.
    pub max_frame_size: u32,
    /// Reply queue capacity per connection.
    pub reply_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reply_queue_capacity: DEFAULT_REPLY_QUEUE_CAPACITY,
        }
    }
}

/// State held while the server is listening.
struct Listening {
    port: u16,
    accept_task: JoinHandle<()>,
    sessions: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// TCP evaluation bridge server.
///
/// Wraps an evaluation engine and a compiler-output directory, and serves
/// framed evaluation requests to any number of connected clients.
/// Evaluations are serialized through the engine no matter how many clients
/// are connected.
pub struct ReplServer {
    gateway: Gateway,
    config: ServerConfig,
    listening: Mutex<Option<Listening>>,
}

impl ReplServer {
    /// Create a server around an engine and its compiler-output directory.
    pub fn new(engine: impl EvalEngine, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(engine, output_dir, ServerConfig::default())
    }

    /// Create a server with explicit limits.
    pub fn with_config(
        engine: impl EvalEngine,
        output_dir: impl Into<PathBuf>,
        config: ServerConfig,
    ) -> Self {
        Self {
            gateway: Gateway::new(Box::new(engine), output_dir),
            config,
            listening: Mutex::new(None),
        }
    }

    /// Bind `port` and start accepting connections.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::InvalidPort`] for port 0
    /// - [`BridgeError::AlreadyListening`] if called again without `stop`
    /// - [`BridgeError::Bind`] if the socket cannot be bound
    ///
    /// None of these consume the server; a failed start may be retried with
    /// another port.
    pub async fn start_listening(&self, port: u16) -> Result<()> {
        if port == 0 {
            return Err(BridgeError::InvalidPort);
        }
        if let Some(active) = &*self.lock_listening() {
            return Err(BridgeError::AlreadyListening(active.port));
        }

        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| BridgeError::Bind { port, source })?;

        let mut slot = self.lock_listening();
        if let Some(active) = &*slot {
            // Lost the race against a concurrent start.
            return Err(BridgeError::AlreadyListening(active.port));
        }

        let sessions = Arc::new(Mutex::new(Vec::new()));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.gateway.clone(),
            self.config.clone(),
            Arc::clone(&sessions),
        ));

        tracing::debug!("listening on port {port}");
        *slot = Some(Listening {
            port,
            accept_task,
            sessions,
        });
        Ok(())
    }

    /// Port currently being listened on, if any.
    pub fn port(&self) -> Option<u16> {
        self.lock_listening().as_ref().map(|l| l.port)
    }

    /// Stop accepting connections and close all active sessions.
    ///
    /// Best-effort and infallible. Session tasks are aborted, but an
    /// evaluation already running on the blocking pool finishes on its own
    /// and releases the engine lock; only its reply is discarded. The
    /// server may be started again afterwards.
    pub fn stop(&self) {
        let Some(active) = self.lock_listening().take() else {
            return;
        };

        active.accept_task.abort();
        let mut sessions = active
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for session in sessions.drain(..) {
            session.abort();
        }
        tracing::debug!("stopped listening on port {}", active.port);
    }

    fn lock_listening(&self) -> std::sync::MutexGuard<'_, Option<Listening>> {
        self.listening
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ReplServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept connections until aborted. Accept errors are logged and skipped;
/// one refused or reset connection never stops the listener.
async fn accept_loop(
    listener: TcpListener,
    gateway: Gateway,
    config: ServerConfig,
    sessions: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("accepted connection from {peer}");
                let task = tokio::spawn(run_session(
                    stream,
                    gateway.clone(),
                    config.clone(),
                    peer.to_string(),
                ));
                let mut sessions = sessions
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                sessions.retain(|t| !t.is_finished());
                sessions.push(task);
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
            }
        }
    }
}
