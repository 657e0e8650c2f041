//! RTSP protocol implementation (RFC 2326 subset).
//!
//! This module handles the text-based RTSP signaling protocol — parsing
//! requests, building responses, routing methods, and generating SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | Purpose |
//! |--------|---------|
//! | OPTIONS | Capability discovery |
//! | DESCRIBE | Retrieve SDP session description |
//! | SETUP | Join the interleaved TCP stream |
//! | PLAY | Acknowledge playback start |
//! | PAUSE | Acknowledged, no effect on delivery |
//! | TEARDOWN | Leave the stream |
//!
//! This is a deliberate point-to-point subset: every request is answered
//! `200 OK`, transport is always `RTP/AVP/TCP;unicast;interleaved=0-1`,
//! and delivery is gated purely by registry membership — PLAY and PAUSE
//! do not start or stop frames.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
