//! Client registry and interleaved frame broadcaster.
//!
//! Viewers that complete SETUP are registered here; every encoded frame
//! is then fanned out as an interleaved data packet on each viewer's own
//! RTSP TCP connection (RFC 2326 §10.12 framing):
//!
//! ```text
//! '$' (0x24) | channel (0x00) | length (u16, big-endian) | payload
//! ```
//!
//! Delivery is gated purely by membership: PLAY and PAUSE acknowledge but
//! do not start or stop frames. A viewer whose write fails is shut down
//! and removed on the spot, so membership stays a subset of the sockets
//! the OS still considers open, and one dead viewer never blocks the
//! rest. All membership mutation — register, deregister, removal on
//! write failure — happens under a single mutex.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use parking_lot::Mutex;

/// Interleaved packet magic byte (`'$'`, RFC 2326 §10.12).
pub const INTERLEAVED_MAGIC: u8 = b'$';

/// Interleaved channel carrying the video data.
pub const RTP_CHANNEL: u8 = 0;

/// Largest payload one interleaved packet can carry (u16 length field).
const MAX_PACKET_LEN: usize = u16::MAX as usize;

/// A registered viewer connection.
///
/// Owned by the registry after SETUP. The originating session loop keeps
/// using the same TCP stream for RTSP signaling; `writer` is the mutex
/// both sides lock before writing, so a response is never spliced into
/// the middle of a frame packet. `socket` is a plain clone kept for
/// shutdown without taking the write lock.
pub struct ClientConnection {
    pub session_id: String,
    socket: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
}

impl ClientConnection {
    pub fn new(session_id: &str, socket: TcpStream, writer: Arc<Mutex<TcpStream>>) -> Self {
        Self {
            session_id: session_id.to_string(),
            socket,
            writer,
        }
    }

    /// Frame and send one payload, flushing before release.
    ///
    /// Payloads above the u16 length limit are carried as consecutive
    /// interleaved packets on the same channel.
    fn send_frame(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        for chunk in payload.chunks(MAX_PACKET_LEN) {
            let header = [
                INTERLEAVED_MAGIC,
                RTP_CHANNEL,
                (chunk.len() >> 8) as u8,
                chunk.len() as u8,
            ];
            writer.write_all(&header)?;
            writer.write_all(chunk)?;
        }
        writer.flush()
    }

    fn close(&self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

/// Thread-safe registry of active viewers, shared by the accept loop,
/// the per-connection handlers, and the encoder-facing broadcast path.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<Vec<ClientConnection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer (called during SETUP).
    pub fn register(&self, client: ClientConnection) {
        let mut clients = self.clients.lock();
        let session_id = client.session_id.clone();
        clients.push(client);
        tracing::debug!(session_id, total = clients.len(), "client registered");
    }

    /// Remove a viewer without closing its socket (called on TEARDOWN —
    /// the connection stays open as the RTSP control channel).
    pub fn deregister(&self, session_id: &str) -> bool {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|c| c.session_id != session_id);
        let removed = clients.len() < before;
        if removed {
            tracing::debug!(session_id, total = clients.len(), "client deregistered");
        }
        removed
    }

    /// Fan one encoded frame out to every registered viewer.
    ///
    /// Writes synchronously in the caller's context; the encoder blocks
    /// until every current viewer has been written to (or dropped). A
    /// failed write closes that viewer's socket and removes it without
    /// aborting delivery to the rest. `is_key_frame` does not gate
    /// delivery — every frame goes to every viewer.
    ///
    /// Returns the number of viewers that received the frame.
    pub fn broadcast(&self, payload: &[u8], is_key_frame: bool) -> usize {
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            return 0;
        }

        clients.retain(|client| match client.send_frame(payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    session_id = %client.session_id,
                    error = %e,
                    "dropping client after write failure"
                );
                client.close();
                false
            }
        });

        tracing::trace!(
            frame_bytes = payload.len(),
            is_key_frame,
            clients = clients.len(),
            "frame broadcast"
        );
        clients.len()
    }

    /// Close every registered socket and clear membership (server shutdown).
    pub fn close_all(&self) {
        let mut clients = self.clients.lock();
        for client in clients.iter() {
            client.close();
        }
        let closed = clients.len();
        clients.clear();
        if closed > 0 {
            tracing::info!(closed, "all clients closed");
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    /// Loopback socket pair: (server-side stream, client-side stream).
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        (server, client)
    }

    fn register_pair(registry: &ClientRegistry, session_id: &str) -> TcpStream {
        let (server, client) = tcp_pair();
        let writer = Arc::new(Mutex::new(server.try_clone().unwrap()));
        registry.register(ClientConnection::new(session_id, server, writer));
        client
    }

    fn read_packet(stream: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).unwrap();
        assert_eq!(header[0], INTERLEAVED_MAGIC);
        assert_eq!(header[1], RTP_CHANNEL);
        let len = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).unwrap();
        payload
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let mut viewers: Vec<TcpStream> = (0..3)
            .map(|i| register_pair(&registry, &format!("sess{i}")))
            .collect();

        let payload = [0u8, 0, 0, 1, 0x65, 0xaa, 0xbb];
        assert_eq!(registry.broadcast(&payload, true), 3);

        for viewer in &mut viewers {
            assert_eq!(read_packet(viewer), payload.to_vec());
        }
    }

    #[test]
    fn broadcast_with_no_clients_is_a_noop() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.broadcast(&[1, 2, 3], false), 0);
    }

    #[test]
    fn oversize_payload_is_chunked() {
        let registry = ClientRegistry::new();
        let mut viewer = register_pair(&registry, "sess0");

        let payload = vec![0x42u8; MAX_PACKET_LEN + 100];
        assert_eq!(registry.broadcast(&payload, false), 1);

        let first = read_packet(&mut viewer);
        let second = read_packet(&mut viewer);
        assert_eq!(first.len(), MAX_PACKET_LEN);
        assert_eq!(second.len(), 100);
        assert_eq!([first, second].concat(), payload);
    }

    #[test]
    fn failed_writer_is_pruned_without_stopping_delivery() {
        let registry = ClientRegistry::new();
        let mut alive = register_pair(&registry, "alive");
        let dead = register_pair(&registry, "dead");

        // Close the viewer side; the kernel needs a write or two to
        // report the broken pipe back, so retry until the prune lands.
        dead.shutdown(Shutdown::Both).unwrap();
        drop(dead);

        let payload = [0u8, 0, 0, 1, 0x41];
        let mut delivered = 0;
        for _ in 0..20 {
            delivered = registry.broadcast(&payload, false);
            if registry.len() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(registry.len(), 1, "dead client must be removed");
        assert_eq!(delivered, 1);
        assert_eq!(read_packet(&mut alive), payload.to_vec());
    }

    #[test]
    fn deregister_removes_without_closing() {
        let registry = ClientRegistry::new();
        let _viewer = register_pair(&registry, "sess0");
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister("sess0"));
        assert!(!registry.deregister("sess0"));
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast(&[1, 2, 3], false), 0);
    }

    #[test]
    fn close_all_clears_and_closes() {
        let registry = ClientRegistry::new();
        let mut viewer = register_pair(&registry, "sess0");
        registry.close_all();
        assert!(registry.is_empty());

        // Server side was shut down; the viewer observes EOF.
        let mut buf = [0u8; 1];
        assert_eq!(viewer.read(&mut buf).unwrap(), 0);
    }
}
