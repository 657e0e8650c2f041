//! Network transport layer.
//!
//! Everything rides one TCP connection per viewer: RTSP signaling and
//! interleaved frame data share the stream (RFC 2326 §10.12), so there
//! is no separate media socket. [`tcp`] owns the accept loop and the
//! per-connection request loop.

pub mod tcp;
