//! H.264 bitstream handling.
//!
//! The server forwards encoder output as-is — Annex B access units framed
//! for interleaved TCP delivery — so no RTP packetization happens here.
//! What the protocol layer does need from the bitstream:
//!
//! - **Parameter sets**: the encoder emits one codec-config buffer
//!   (SPS + PPS back to back) before any frame data. [`h264`] splits it
//!   and caches the pair for DESCRIBE responses.
//! - **Unit scanning**: locating `00 00 00 01` / `00 00 01` start codes,
//!   used both for the config split and for slicing file-based sources
//!   into deliverable units.

pub mod h264;

pub use h264::{ParameterSetCache, ParameterSets};
