//! Receive path: packets from the medium are turned back into PHY octets and
//! fed to the chip one octet at a time, at the air rate.

use emu802154_core::RadioPacket;
use log::{debug, trace, warn};

use crate::chip::ChipAdapter;
use crate::framing;
use crate::scheduler::{RadioTask, Scheduler};
use crate::state::LinkState;
use crate::transceiver::Transceiver;

impl<C: ChipAdapter, S: Scheduler> Transceiver<C, S> {
    /// Queues `packet` for octet-wise delivery to the chip.
    ///
    /// Delivery starts now, or right after the last octet of a packet that is
    /// still being delivered. Octets queued while interfered are replaced by
    /// the corrupt byte.
    pub fn deliver(&mut self, packet: &RadioPacket) {
        let ppdu = match framing::encode(packet.data()) {
            Ok(ppdu) => ppdu,
            Err(e) => {
                warn!("mote {}: cannot deliver packet: {}", self.id, e);
                return;
            }
        };

        let delay = self.config.inter_byte_delay();
        let mut at = self.scheduler.now().max(self.rx_busy_until);
        debug!("mote {}: delivering {} PHY bytes from {} us", self.id, ppdu.len(), at);

        self.rx_in_flight.push_back(Some(packet.clone()));
        for (i, &b) in ppdu.iter().enumerate() {
            let byte = if self.state == LinkState::Interfered {
                self.config.corrupt_byte
            } else {
                b
            };
            let last = i + 1 == ppdu.len();
            self.scheduler.schedule(at, RadioTask::DeliverByte { byte, last });
            at = at.saturating_add(delay);
        }
        self.rx_busy_until = at;
    }

    /// Takes one raw octet straight from a radio of the same chip family.
    pub fn receive_custom_data(&mut self, byte: u8) {
        self.last_incoming_byte = Some(byte);
        self.push_rx_byte(byte);
    }

    pub(crate) fn accept_rx_byte(&mut self, byte: u8, last: bool) {
        self.push_rx_byte(byte);
        if !last {
            return;
        }

        match self.rx_in_flight.pop_front() {
            Some(Some(packet)) if self.state != LinkState::Off => {
                debug!("mote {}: packet received ({} bytes)", self.id, packet.len());
                self.last_incoming_packet = Some(packet);
            }
            Some(_) => trace!("mote {}: delivered packet discarded", self.id),
            None => warn!("mote {}: final octet without a packet in flight", self.id),
        }
    }

    fn push_rx_byte(&mut self, byte: u8) {
        if self.state == LinkState::Off {
            trace!("mote {}: radio off, dropping rx byte {:#04x}", self.id, byte);
            return;
        }
        let byte = if self.state == LinkState::Interfered {
            self.config.corrupt_byte
        } else {
            byte
        };
        self.last_incoming_byte = Some(byte);
        self.chip.receive_byte(byte);
    }

    /// Forgets everything received or still being received.
    pub(crate) fn drop_incoming(&mut self) {
        self.last_incoming_packet = None;
        for entry in self.rx_in_flight.iter_mut() {
            *entry = None;
        }
    }
}
