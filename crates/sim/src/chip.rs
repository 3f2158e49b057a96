//! Stand-in radio chips driven by the simulation instead of real firmware.

use std::collections::VecDeque;

use emu802154_core::{ChipKind, ConvertedPacket, MAX_FRAME_LEN};
use emu802154_radio::framing::{self, LENGTH_OFFSET, PHY_HEADER_LEN, PREAMBLE_LEN, SFD};
use emu802154_radio::ChipAdapter;
use log::{debug, trace};

/// Rebuilds PHY frames from a raw octet stream.
///
/// Octets that cannot start a frame (non-zero preamble, wrong delimiter,
/// impossible length) are skipped, so the sniffer resynchronises after
/// corrupted bytes.
#[derive(Debug, Default)]
pub struct FrameSniffer {
    buffer: Vec<u8>,
    skipped: usize,
}

impl FrameSniffer {
    pub fn push(&mut self, byte: u8) -> Option<ConvertedPacket> {
        self.buffer.push(byte);
        self.resync();

        if self.buffer.len() < PHY_HEADER_LEN {
            return None;
        }
        let total = PHY_HEADER_LEN + self.buffer[LENGTH_OFFSET] as usize;
        if self.buffer.len() < total {
            return None;
        }

        let frame: Vec<u8> = self.buffer.drain(..total).collect();
        framing::decode(&frame).ok()
    }

    /// Octets discarded while hunting for a frame start.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn resync(&mut self) {
        while !self.buffer.is_empty() && !self.plausible_prefix() {
            self.buffer.remove(0);
            self.skipped += 1;
        }
    }

    fn plausible_prefix(&self) -> bool {
        self.buffer.iter().enumerate().take(PHY_HEADER_LEN).all(|(i, &b)| match i {
            i if i < PREAMBLE_LEN => b == 0,
            i if i == PREAMBLE_LEN => b == SFD,
            _ => b as usize <= MAX_FRAME_LEN,
        })
    }
}

/// Emulated chip with just enough behaviour to exercise a transceiver: a
/// transmit queue the simulation shifts out, and a receive side that
/// reassembles and checks incoming frames.
#[derive(Debug)]
pub struct FirmwareChip {
    kind: ChipKind,
    tx_queue: VecDeque<u8>,
    sniffer: FrameSniffer,
    completed: Vec<ConvertedPacket>,
    rssi_register: i32,
    power_indicator: u8,
    pub frames_received: usize,
    pub fcs_errors: usize,
}

impl FirmwareChip {
    pub fn new(kind: ChipKind) -> Self {
        Self {
            kind,
            tx_queue: VecDeque::new(),
            sniffer: FrameSniffer::default(),
            completed: Vec::new(),
            rssi_register: 0,
            power_indicator: 31,
            frames_received: 0,
            fcs_errors: 0,
        }
    }

    /// Queues a whole PPDU for transmission.
    pub fn load_frame(&mut self, ppdu: &[u8]) {
        self.tx_queue.extend(ppdu.iter().copied());
    }

    /// Next octet for the transceiver, if any.
    pub fn shift_out(&mut self) -> Option<u8> {
        self.tx_queue.pop_front()
    }

    /// Drops whatever the firmware had not shifted out yet.
    pub fn flush_tx(&mut self) {
        self.tx_queue.clear();
    }

    pub fn has_pending_tx(&self) -> bool {
        !self.tx_queue.is_empty()
    }

    /// Frames completed since the last call.
    pub fn take_frames(&mut self) -> Vec<ConvertedPacket> {
        std::mem::take(&mut self.completed)
    }

    pub fn rssi_register(&self) -> i32 {
        self.rssi_register
    }

    pub fn set_power_indicator(&mut self, indicator: u8) {
        self.power_indicator = indicator.min(self.output_power_indicator_max());
    }

    pub fn bytes_skipped(&self) -> usize {
        self.sniffer.skipped()
    }
}

impl ChipAdapter for FirmwareChip {
    fn kind(&self) -> ChipKind {
        self.kind.clone()
    }

    fn receive_byte(&mut self, byte: u8) {
        if let Some(frame) = self.sniffer.push(byte) {
            if framing::fcs_matches(&frame) {
                self.frames_received += 1;
                trace!("{} chip: frame of {} bytes", self.kind, frame.packet.len());
            } else {
                self.fcs_errors += 1;
                debug!("{} chip: FCS mismatch, raw {}", self.kind, hex::encode(&frame.raw));
            }
            self.completed.push(frame);
        }
    }

    fn write_rssi(&mut self, rssi: i32) {
        self.rssi_register = rssi;
    }

    fn output_power(&self) -> f64 {
        // CC2420 datasheet: 0 dBm at PA_LEVEL 31, -25 dBm at 3
        -25.0 + 25.0 * (self.power_indicator.saturating_sub(3) as f64 / 28.0)
    }

    fn output_power_indicator(&self) -> u8 {
        self.power_indicator
    }
}
