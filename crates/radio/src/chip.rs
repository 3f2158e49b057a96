//! Hooks back into the emulated radio chip.

use emu802154_core::ChipKind;

/// What the transceiver needs from the emulated chip it fronts.
///
/// The chip drives the transceiver through `Transceiver::accept_tx_byte`,
/// `set_hardware_ready` and `report_strength`; the transceiver answers through
/// this trait.
pub trait ChipAdapter {
    fn kind(&self) -> ChipKind;

    /// Feeds one received octet into the chip's receive FIFO.
    fn receive_byte(&mut self, byte: u8);

    /// Writes the averaged signal strength into the chip's RSSI register.
    fn write_rssi(&mut self, rssi: i32);

    fn start_of_reception(&mut self) {}

    fn end_of_reception(&mut self) {}

    fn output_power(&self) -> f64 {
        0.0
    }

    fn output_power_indicator(&self) -> u8 {
        self.output_power_indicator_max()
    }

    fn output_power_indicator_max(&self) -> u8 {
        31
    }
}

impl<C: ChipAdapter + ?Sized> ChipAdapter for Box<C> {
    fn kind(&self) -> ChipKind {
        (**self).kind()
    }

    fn receive_byte(&mut self, byte: u8) {
        (**self).receive_byte(byte)
    }

    fn write_rssi(&mut self, rssi: i32) {
        (**self).write_rssi(rssi)
    }

    fn start_of_reception(&mut self) {
        (**self).start_of_reception()
    }

    fn end_of_reception(&mut self) {
        (**self).end_of_reception()
    }

    fn output_power(&self) -> f64 {
        (**self).output_power()
    }

    fn output_power_indicator(&self) -> u8 {
        (**self).output_power_indicator()
    }

    fn output_power_indicator_max(&self) -> u8 {
        (**self).output_power_indicator_max()
    }
}

/// Chip stand-in that records everything written to it.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingChip {
    pub received: Vec<u8>,
    pub rssi_writes: Vec<i32>,
    pub receptions_started: usize,
    pub receptions_ended: usize,
}

#[cfg(test)]
impl ChipAdapter for RecordingChip {
    fn kind(&self) -> ChipKind {
        ChipKind::Cc2420
    }

    fn receive_byte(&mut self, byte: u8) {
        self.received.push(byte);
    }

    fn write_rssi(&mut self, rssi: i32) {
        self.rssi_writes.push(rssi);
    }

    fn start_of_reception(&mut self) {
        self.receptions_started += 1;
    }

    fn end_of_reception(&mut self) {
        self.receptions_ended += 1;
    }
}
