//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                                ← protocol version
//! o=- 0 0 IN IP4 127.0.0.1          ← origin (fixed loopback)
//! s=<session-name>                   ← session name
//! t=0 0                              ← timing (live stream)
//! m=video 0 RTP/AVP 96               ← media description
//! c=IN IP4 0.0.0.0                   ← connection address
//! a=rtpmap:96 H264/90000             ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=<sps>,<pps>
//! a=control:trackID=1                ← track control URL
//! ```
//!
//! Viewers decode the first frames from `sprop-parameter-sets`, so the
//! SPS/PPS pair captured from the encoder is embedded Base64-encoded.
//! Before the encoder's config event the fields are empty strings and
//! clients are expected to retry.

use base64::prelude::{BASE64_STANDARD, Engine as _};

/// RTP payload type advertised for the video track (dynamic range, RFC 3551).
pub const PAYLOAD_TYPE: u8 = 96;

/// H.264 RTP clock rate in Hz (RFC 6184 §8.1).
pub const CLOCK_RATE: u32 = 90000;

/// Generate the session description for the single video track.
///
/// Deterministic in its inputs and side-effect free. `sps`/`pps` are the
/// raw parameter-set byte strings (start codes included, as cached);
/// empty slices encode to empty Base64 strings.
pub fn build_sdp(session_name: &str, sps: &[u8], pps: &[u8]) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push("o=- 0 0 IN IP4 127.0.0.1".to_string());
    sdp.push(format!("s={}", session_name));
    sdp.push("t=0 0".to_string());
    sdp.push(format!("m=video 0 RTP/AVP {}", PAYLOAD_TYPE));
    sdp.push("c=IN IP4 0.0.0.0".to_string());
    sdp.push(format!("a=rtpmap:{} H264/{}", PAYLOAD_TYPE, CLOCK_RATE));
    sdp.push(format!(
        "a=fmtp:{} packetization-mode=1;sprop-parameter-sets={},{}",
        PAYLOAD_TYPE,
        BASE64_STANDARD.encode(sps),
        BASE64_STANDARD.encode(pps)
    ));
    sdp.push("a=control:trackID=1".to_string());

    format!("{}\r\n", sdp.join("\r\n"))
}
