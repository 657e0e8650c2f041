use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::media::h264::ParameterSetCache;
use crate::protocol::handler::{ALLOWED_METHODS, MethodHandler};
use crate::protocol::{RtspRequest, RtspResponse};
use crate::registry::ClientRegistry;
use crate::server::ServerConfig;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Each accepted connection gets its own thread; the loop itself never
/// blocks on a per-connection operation.
pub fn accept_loop(
    listener: TcpListener,
    registry: ClientRegistry,
    parameter_sets: ParameterSetCache,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let r = registry.clone();
                let p = parameter_sets.clone();
                let c = config.clone();
                let flag = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, r, p, c, flag);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP client connection with its own lifecycle.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: Arc<Mutex<TcpStream>>,
    handler: MethodHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        registry: ClientRegistry,
        parameter_sets: ParameterSetCache,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        // A stalled viewer must not pin the broadcast loop forever; a
        // timed-out write counts as a write failure and drops the client.
        if stream.set_write_timeout(config.write_timeout).is_err() {
            return;
        }

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let writer = Arc::new(Mutex::new(stream));
        let handler = MethodHandler::new(
            registry.clone(),
            parameter_sets,
            config,
            peer_addr,
            writer.clone(),
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer,
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.cleanup(&registry);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            let response = match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method_name,
                        uri = %request.uri,
                        "request"
                    );
                    self.handler.handle(&request)
                }
                // Malformed request line: answer like OPTIONS instead of
                // dropping the connection; only a failed read ends it.
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    RtspResponse::ok("1").add_header("Public", ALLOWED_METHODS)
                }
            };

            if self
                .writer
                .lock()
                .write_all(response.serialize().as_bytes())
                .is_err()
            {
                return "write error";
            }

            // SETUP registration waits for the response to hit the wire.
            self.handler.commit();
        }

        "server shutting down"
    }

    /// Remove registry entries owned by this connection.
    fn cleanup(&self, registry: &ClientRegistry) {
        let orphaned = self.handler.session_ids().to_vec();
        for session_id in &orphaned {
            registry.deregister(session_id);
        }
        if !orphaned.is_empty() {
            tracing::info!(
                peer = %self.peer_addr,
                removed = orphaned.len(),
                "cleaned up registrations on disconnect"
            );
        }
    }
}
