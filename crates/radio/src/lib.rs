//! byte-level 802.15.4 transceiver emulation

use emu802154_core::{SimTime, MAX_FRAME_LEN, MILLISECOND};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod chip;
pub mod framing;
pub mod receive;
pub mod rssi;
pub mod scheduler;
pub mod state;
pub mod transceiver;
pub mod transmit;

pub use chip::ChipAdapter;
pub use framing::{decode, encode, PHY_HEADER_LEN, PREAMBLE_LEN, SFD};
pub use scheduler::{EventQueue, RadioTask, Scheduler, SharedQueue};
pub use state::{EventLog, LinkState, Notification, ObserverId, RadioEvent, RadioObserver};
pub use transceiver::Transceiver;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("transmit buffer full ({len} bytes), dropping outgoing byte {byte:#04x}")]
    OversizedFrame { len: usize, byte: u8 },

    #[error("payload of {0} bytes does not fit an 802.15.4 frame")]
    PayloadTooLarge(usize),

    #[error("truncated PHY frame: need {needed} bytes, have {actual}")]
    TruncatedFrame { needed: usize, actual: usize },

    #[error("invalid radio config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub bit_rate_bps: u32,
    pub max_payload_len: usize,
    /// Room reserved for preamble, delimiter and length on top of the PSDU.
    pub phy_overhead: usize,
    /// Value substituted for every byte received while interfered.
    pub corrupt_byte: u8,
}

impl RadioConfig {
    /// Time between two consecutive octets at the configured bit rate.
    pub fn inter_byte_delay(&self) -> SimTime {
        (1000.0 * MILLISECOND as f64 / (self.bit_rate_bps as f64 / 8.0)) as SimTime
    }

    pub fn tx_buffer_capacity(&self) -> usize {
        self.max_payload_len + self.phy_overhead
    }

    pub fn validate(&self) -> Result<(), RadioError> {
        if self.bit_rate_bps == 0 {
            return Err(RadioError::InvalidConfig("bit rate must be positive".into()));
        }
        if self.max_payload_len > MAX_FRAME_LEN {
            return Err(RadioError::InvalidConfig(format!(
                "max payload {} exceeds the {} byte frame limit",
                self.max_payload_len, MAX_FRAME_LEN
            )));
        }
        Ok(())
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bit_rate_bps: 250_000,
            max_payload_len: MAX_FRAME_LEN,
            phy_overhead: 15,
            corrupt_byte: 0xFF,
        }
    }
}
