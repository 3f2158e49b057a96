//! Air traffic captured during a simulation run.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use emu802154_core::{ChipKind, MoteId, RadioPacket, SimTime};
use emu802154_radio::{EventLog, EventQueue, RadioEvent, SharedQueue, Transceiver};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::chip::FirmwareChip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Tx,
    Rx,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub time: SimTime,
    pub mote: MoteId,
    pub direction: Direction,
    /// Octets as they went over the air, PHY header included.
    pub ppdu: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).context("failed to encode trace")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (trace, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .context("failed to decode trace")?;
        Ok(trace)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).with_context(|| format!("failed to write trace {}", path.display()))?;
        debug!("wrote {} trace records to {}", self.records.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read trace {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    /// Feeds every octet `mote` transmitted through a fresh transceiver and
    /// returns the packets it assembles.
    pub fn replay_tx(&self, mote: MoteId) -> Vec<RadioPacket> {
        let queue: SharedQueue = Rc::new(RefCell::new(EventQueue::new()));
        let mut radio = Transceiver::new(mote, FirmwareChip::new(ChipKind::Cc2420), queue);
        let log = EventLog::new();
        radio.subscribe(log.clone());
        radio.set_hardware_ready(true);

        let octets = self
            .records
            .iter()
            .filter(|r| r.mote == mote && r.direction == Direction::Tx)
            .flat_map(|r| r.ppdu.iter().copied());
        for byte in octets {
            if let Err(e) = radio.accept_tx_byte(byte) {
                debug!("replay of mote {}: {}", mote, e);
            }
        }

        log.events()
            .into_iter()
            .filter_map(|event| match event {
                RadioEvent::PacketTransmitted(packet) if !packet.is_empty() => Some(packet),
                _ => None,
            })
            .collect()
    }
}
