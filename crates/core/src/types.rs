use serde::{Deserialize, Serialize};

/// Simulated time in microseconds.
pub type SimTime = u64;
pub type MoteId = u32;

pub const MICROSECOND: SimTime = 1;
pub const MILLISECOND: SimTime = 1000 * MICROSECOND;
pub const SECOND: SimTime = 1000 * MILLISECOND;

/// Maximum PSDU length of an 802.15.4 frame, including the FCS.
pub const MAX_FRAME_LEN: usize = 127;
pub const FCS_LEN: usize = 2;
/// Largest logical payload that still fits a frame once the FCS is appended.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FCS_LEN;

/// Radio chip family behind a transceiver. Raw bytes only travel between
/// transceivers of the same family.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipKind {
    Cc2420,
    AtRfa1,
    Other(String),
}

impl std::fmt::Display for ChipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChipKind::Cc2420 => write!(f, "CC2420"),
            ChipKind::AtRfa1 => write!(f, "RFA1"),
            ChipKind::Other(name) => write!(f, "{}", name),
        }
    }
}
