use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngExt;

use crate::media::h264::ParameterSetCache;
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::registry::{ClientConnection, ClientRegistry};
use crate::server::ServerConfig;

/// Methods advertised in OPTIONS responses and the parse-fallback reply.
pub const ALLOWED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY";

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks which registry entries were created on this connection so they
/// can be removed when the connection drops. Holds the connection's
/// shared writer — the same mutex the broadcaster locks when sending
/// interleaved frames, so responses and frames never interleave
/// mid-packet on the wire.
pub struct MethodHandler {
    registry: ClientRegistry,
    parameter_sets: ParameterSetCache,
    config: Arc<ServerConfig>,
    peer_addr: SocketAddr,
    writer: Arc<Mutex<TcpStream>>,
    /// Session IDs registered during this connection, for cleanup on disconnect.
    session_ids: Vec<String>,
    /// Registration deferred until the SETUP response reaches the wire.
    pending: Option<ClientConnection>,
}

impl MethodHandler {
    pub fn new(
        registry: ClientRegistry,
        parameter_sets: ParameterSetCache,
        config: Arc<ServerConfig>,
        peer_addr: SocketAddr,
        writer: Arc<Mutex<TcpStream>>,
    ) -> Self {
        MethodHandler {
            registry,
            parameter_sets,
            config,
            peer_addr,
            writer,
            session_ids: Vec::new(),
            pending: None,
        }
    }

    /// Session IDs owned by this connection (for cleanup on disconnect).
    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    /// Complete a registration deferred by SETUP.
    ///
    /// Called once the response has been written: the viewer must never
    /// receive an interleaved frame ahead of its SETUP reply.
    pub fn commit(&mut self) {
        if let Some(client) = self.pending.take() {
            tracing::info!(
                session_id = %client.session_id,
                peer = %self.peer_addr,
                "viewer joined via SETUP"
            );
            self.registry.register(client);
        }
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        match request.method {
            Some(Method::Options) => self.handle_options(request),
            Some(Method::Describe) => self.handle_describe(request),
            Some(Method::Setup) => self.handle_setup(request),
            Some(Method::Play) => self.handle_play(request),
            Some(Method::Pause) => {
                tracing::debug!(cseq = %request.cseq, "PAUSE acknowledged");
                RtspResponse::ok(&request.cseq)
            }
            Some(Method::Teardown) => self.handle_teardown(request),
            None => {
                tracing::debug!(
                    method = %request.method_name,
                    cseq = %request.cseq,
                    "unsupported RTSP method acknowledged"
                );
                RtspResponse::ok(&request.cseq)
            }
        }
    }

    fn handle_options(&self, request: &RtspRequest) -> RtspResponse {
        tracing::debug!(cseq = %request.cseq, "OPTIONS");
        RtspResponse::ok(&request.cseq).add_header("Public", ALLOWED_METHODS)
    }

    fn handle_describe(&self, request: &RtspRequest) -> RtspResponse {
        tracing::debug!(cseq = %request.cseq, uri = %request.uri, "DESCRIBE");

        let sets = self.parameter_sets.snapshot();
        if sets.is_none() {
            tracing::debug!(
                peer = %self.peer_addr,
                "DESCRIBE before parameter sets, sending empty sprop fields"
            );
        }
        let (sps, pps) = sets.map(|s| (s.sps, s.pps)).unwrap_or_default();
        let body = sdp::build_sdp(&self.config.session_name, &sps, &pps);

        RtspResponse::ok(&request.cseq)
            .add_header("Content-Base", &request.uri)
            .add_header("Content-Type", "application/sdp")
            .with_body(body)
    }

    fn handle_setup(&mut self, request: &RtspRequest) -> RtspResponse {
        let session_id = new_session_id();
        tracing::debug!(cseq = %request.cseq, uri = %request.uri, session_id, "SETUP");

        let socket = self.writer.lock().try_clone();
        match socket {
            Ok(socket) => {
                self.pending = Some(ClientConnection::new(
                    &session_id,
                    socket,
                    self.writer.clone(),
                ));
                self.session_ids.push(session_id.clone());
            }
            // The socket is already unusable; answer anyway and let the
            // connection loop observe the failure on its next write.
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "SETUP could not clone socket");
            }
        }

        RtspResponse::ok(&request.cseq)
            .add_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1")
            .add_header("Session", &session_id)
    }

    fn handle_play(&self, request: &RtspRequest) -> RtspResponse {
        tracing::debug!(cseq = %request.cseq, uri = %request.uri, "PLAY acknowledged");
        let rtp_info = format!("url={}/trackID=1;seq=0", request.uri);
        RtspResponse::ok(&request.cseq).add_header("RTP-Info", &rtp_info)
    }

    fn handle_teardown(&mut self, request: &RtspRequest) -> RtspResponse {
        for session_id in self.session_ids.drain(..) {
            self.registry.deregister(&session_id);
            tracing::info!(session_id, peer = %self.peer_addr, "viewer left via TEARDOWN");
        }
        RtspResponse::ok(&request.cseq)
    }
}

/// Fresh 16-hex-digit session identifier for the `Session` header.
fn new_session_id() -> String {
    format!("{:016X}", rand::rng().random::<u64>())
}
