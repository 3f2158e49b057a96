use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Logical packet exchanged with the radio medium: the PHY payload without
/// preamble, delimiter, length or FCS.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioPacket {
    data: Bytes,
}

impl RadioPacket {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for RadioPacket {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for RadioPacket {
    fn from(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }
}

/// Result of converting a PPDU back into a logical packet.
///
/// `raw` always holds the frame as it appeared after the length byte (FCS
/// included) so a frame that could not be converted can still be logged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedPacket {
    pub packet: RadioPacket,
    pub raw: Bytes,
}

impl ConvertedPacket {
    /// A frame whose length field was too short to hold the FCS.
    pub fn is_malformed(&self) -> bool {
        self.raw.len() < crate::FCS_LEN
    }
}
