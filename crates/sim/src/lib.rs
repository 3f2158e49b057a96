//! simulation tools for the 802.15.4 transceiver emulation

pub mod chip;
pub mod medium;
pub mod simulation;
pub mod trace;

use std::path::Path;

use anyhow::{bail, Context, Result};
use emu802154_core::{ChipKind, SimTime, MAX_PAYLOAD_LEN, MILLISECOND, SECOND};
use emu802154_radio::RadioConfig;
use serde::{Deserialize, Serialize};

pub use chip::{FirmwareChip, FrameSniffer};
pub use medium::{BroadcastMedium, MediumStats};
pub use simulation::{Simulation, SimulationReport};
pub use trace::{Direction, Trace, TraceRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationConfig {
    pub motes: u32,
    /// Chip family per mote, assigned round-robin.
    pub chip_kinds: Vec<ChipKind>,
    pub channel: i32,
    pub packets_per_mote: u32,
    pub payload_len: usize,
    pub send_interval: SimTime,
    pub duration: SimTime,
    /// Probability that a receiver misses a transmission entirely.
    pub packet_loss: f64,
    pub rssi_mean: f64,
    pub rssi_std_dev: f64,
    /// Signal strength reported to a receiver once the channel is quiet again.
    pub noise_floor: f64,
    pub seed: u64,
    pub radio: RadioConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            motes: 4,
            chip_kinds: vec![ChipKind::Cc2420],
            channel: 26,
            packets_per_mote: 10,
            payload_len: 20,
            send_interval: 100 * MILLISECOND,
            duration: 5 * SECOND,
            packet_loss: 0.0,
            rssi_mean: -60.0,
            rssi_std_dev: 0.0,
            noise_floor: -100.0,
            seed: 1,
            radio: RadioConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.packet_loss) {
            bail!("packet loss {} is not a probability", self.packet_loss);
        }
        if !(self.rssi_std_dev >= 0.0 && self.rssi_std_dev.is_finite()) {
            bail!("RSSI std dev {} must be finite and non-negative", self.rssi_std_dev);
        }
        if self.payload_len > MAX_PAYLOAD_LEN {
            bail!("payload of {} bytes does not fit a frame (max {})", self.payload_len, MAX_PAYLOAD_LEN);
        }
        self.radio.validate()?;
        Ok(())
    }
}

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn clean_channel() -> SimulationConfig {
        SimulationConfig::default()
    }

    pub fn lossy_channel() -> SimulationConfig {
        SimulationConfig {
            packet_loss: 0.25,
            rssi_mean: -85.0,
            rssi_std_dev: 4.0,
            ..Default::default()
        }
    }

    pub fn mixed_chips() -> SimulationConfig {
        SimulationConfig {
            motes: 6,
            chip_kinds: vec![ChipKind::Cc2420, ChipKind::AtRfa1],
            rssi_std_dev: 2.0,
            ..Default::default()
        }
    }

    /// Short send interval so transmissions overlap and collide.
    pub fn congested() -> SimulationConfig {
        SimulationConfig {
            motes: 8,
            packets_per_mote: 40,
            payload_len: 100,
            send_interval: 4 * MILLISECOND,
            duration: SECOND,
            rssi_std_dev: 3.0,
            ..Default::default()
        }
    }

    pub fn all() -> Vec<(&'static str, SimulationConfig)> {
        vec![
            ("Clean Channel", Self::clean_channel()),
            ("Lossy Channel", Self::lossy_channel()),
            ("Mixed Chips", Self::mixed_chips()),
            ("Congested", Self::congested()),
        ]
    }
}
