use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{CastError, Result};
use crate::media::h264::{ParameterSetCache, ParameterSets};
use crate::registry::ClientRegistry;
use crate::transport::tcp;

/// Server-level configuration used by protocol handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SDP session name (`s=`).
    pub session_name: String,
    /// Per-client write timeout; a timed-out broadcast write drops the
    /// client. `None` disables the timeout (a stalled viewer can then
    /// stall the broadcast loop).
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_name: "Screen".to_string(),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// High-level mirroring server orchestrator.
///
/// Owns the two pieces of shared state — the viewer registry and the
/// parameter-set cache — and hands clones of them to the accept loop in
/// [`tcp`]. The capture/encoder collaborator feeds it through
/// [`on_parameter_sets`](Self::on_parameter_sets) /
/// [`on_codec_config`](Self::on_codec_config) and
/// [`on_encoded_frame`](Self::on_encoded_frame); data flows one way, the
/// server never calls back into the collaborator.
pub struct Server {
    registry: ClientRegistry,
    parameter_sets: ParameterSetCache,
    running: Arc<AtomicBool>,
    bind_addr: String,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    /// Create a server with custom protocol/SDP configuration.
    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            registry: ClientRegistry::new(),
            parameter_sets: ParameterSetCache::new(),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            config: Arc::new(config),
        }
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Bind failure (e.g. port already in use) is fatal to startup and
    /// surfaced to the caller; it is not retried internally.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CastError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let registry = self.registry.clone();
        let parameter_sets = self.parameter_sets.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tracing::info!(addr = %self.bind_addr, "mirroring server listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, registry, parameter_sets, config, running);
        });

        Ok(())
    }

    /// Cancel the accept loop and close every registered viewer.
    ///
    /// In-flight session loops observe the resulting socket errors and
    /// terminate on their own.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.registry.close_all();
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Encoder collaborator callback: parameter sets, already split.
    ///
    /// Invoked once per capture session, before any frame data. Readers
    /// of the cache see the pair replaced atomically.
    pub fn on_parameter_sets(&self, sps: &[u8], pps: &[u8]) {
        self.parameter_sets.set(ParameterSets {
            sps: sps.to_vec(),
            pps: pps.to_vec(),
        });
    }

    /// Encoder collaborator callback: raw codec-config buffer.
    ///
    /// Splits the buffer into SPS and PPS and caches the pair. Returns
    /// `false` when no split point was found; the previous pair (if any)
    /// stays in effect and DESCRIBE degrades until the encoder retries.
    pub fn on_codec_config(&self, config: &[u8]) -> bool {
        self.parameter_sets.update_from_config(config)
    }

    /// Encoder collaborator callback: one encoded access unit.
    ///
    /// Broadcasts synchronously to every registered viewer and returns
    /// how many received it. `is_key_frame` is carried for observability
    /// but does not gate delivery.
    pub fn on_encoded_frame(&self, payload: &[u8], is_key_frame: bool) -> usize {
        self.registry.broadcast(payload, is_key_frame)
    }

    /// Number of currently registered viewers.
    pub fn viewer_count(&self) -> usize {
        self.registry.len()
    }
}
