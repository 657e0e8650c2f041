use std::sync::Arc;

use parking_lot::RwLock;

/// 4-byte Annex B start code delimiting NAL units.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// NAL unit type for an IDR slice (key frame).
pub const NAL_IDR: u8 = 5;
/// NAL unit type for a sequence parameter set.
pub const NAL_SPS: u8 = 7;
/// NAL unit type for a picture parameter set.
pub const NAL_PPS: u8 = 8;

/// H.264 sequence and picture parameter sets, start codes included.
///
/// Both byte strings keep their leading `00 00 00 01` marker so they can
/// be prepended to the outgoing bitstream verbatim; Base64 encoding for
/// the SDP `sprop-parameter-sets` field uses them as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

/// Split a codec-config buffer into SPS and PPS.
///
/// Encoders emit SPS and PPS back to back in one config buffer, each with
/// its own 4-byte start code. The first start code is assumed to sit at
/// offset 0; the split point is the first start code found at offset 4 or
/// later. Returns `None` when no second start code exists in the scanned
/// range (e.g. buffers shorter than 8 bytes) — the caller keeps whatever
/// parameter sets it already has.
pub fn split_parameter_sets(config: &[u8]) -> Option<ParameterSets> {
    let split = config
        .get(4..)?
        .windows(START_CODE.len())
        .position(|w| w == START_CODE)?
        + 4;

    Some(ParameterSets {
        sps: config[..split].to_vec(),
        pps: config[split..].to_vec(),
    })
}

/// Split an Annex B bitstream into NAL units, start codes included.
///
/// Handles both 4-byte (`00 00 00 01`) and 3-byte (`00 00 01`) start
/// codes. Each returned slice begins with its own start code and runs up
/// to the next one, so units can be framed for delivery without
/// reassembly. Data before the first start code is ignored.
pub fn split_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        if data[i..].starts_with(&START_CODE) {
            starts.push(i);
            i += 4;
        } else if data[i..].starts_with(&START_CODE[1..]) {
            starts.push(i);
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(idx, &start)| {
            let end = starts.get(idx + 1).copied().unwrap_or(data.len());
            &data[start..end]
        })
        .collect()
}

/// NAL unit type (lower 5 bits of the first header byte) of a unit that
/// may or may not carry a leading start code.
pub fn unit_type(unit: &[u8]) -> Option<u8> {
    let body = if unit.starts_with(&START_CODE) {
        &unit[4..]
    } else if unit.starts_with(&START_CODE[1..]) {
        &unit[3..]
    } else {
        unit
    };
    body.first().map(|b| b & 0x1f)
}

/// Shared cache of the current parameter sets.
///
/// Written once per capture session (on the encoder's config event) and
/// read by every DESCRIBE handler. The pair is replaced whole under the
/// write lock and snapshotted whole under the read lock, so readers see
/// either the fully-old or fully-new pair, never a torn mix.
#[derive(Clone, Default)]
pub struct ParameterSetCache {
    inner: Arc<RwLock<Option<ParameterSets>>>,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached pair.
    pub fn set(&self, sets: ParameterSets) {
        tracing::debug!(
            sps_len = sets.sps.len(),
            pps_len = sets.pps.len(),
            "parameter sets updated"
        );
        *self.inner.write() = Some(sets);
    }

    /// Split a raw codec-config buffer and cache the result.
    ///
    /// Returns `false` (keeping the prior pair) when no split point is
    /// found; DESCRIBE degrades gracefully until the encoder retries.
    pub fn update_from_config(&self, config: &[u8]) -> bool {
        match split_parameter_sets(config) {
            Some(sets) => {
                self.set(sets);
                true
            }
            None => {
                tracing::warn!(
                    config_len = config.len(),
                    "codec config had no SPS/PPS boundary, keeping previous parameter sets"
                );
                false
            }
        }
    }

    /// Snapshot of the current pair, if any.
    pub fn snapshot(&self) -> Option<ParameterSets> {
        self.inner.read().clone()
    }
}
