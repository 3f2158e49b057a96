//! Transmit path: octets shifted out by the chip are collected into a PPDU
//! and handed to the medium as a packet once the frame is complete.

use bytes::BufMut;
use emu802154_core::RadioPacket;
use log::{debug, trace, warn};

use crate::chip::ChipAdapter;
use crate::framing::{self, PHY_HEADER_LEN};
use crate::scheduler::Scheduler;
use crate::state::{LinkState, RadioEvent};
use crate::transceiver::Transceiver;
use crate::RadioError;

impl<C: ChipAdapter, S: Scheduler> Transceiver<C, S> {
    /// Takes one octet the chip transmitted.
    ///
    /// The frame length is read from the sixth octet (4 preamble, SFD,
    /// length). Frames shorter than that only end when the radio is switched
    /// off. Once the buffer is full further octets are refused until the frame
    /// is ended that way.
    pub fn accept_tx_byte(&mut self, byte: u8) -> Result<(), RadioError> {
        if self.state != LinkState::Transmitting {
            if self.state == LinkState::Off {
                warn!("mote {}: transmitting while radio is off", self.id);
            }
            self.enter(LinkState::Transmitting);
            self.emit(RadioEvent::TransmissionStarted);
        }

        if self.tx_buffer.len() >= self.config.tx_buffer_capacity() {
            let err = RadioError::OversizedFrame {
                len: self.tx_buffer.len(),
                byte,
            };
            warn!("mote {}: {}", self.id, err);
            return Err(err);
        }

        self.last_outgoing_byte = Some(byte);
        self.emit(RadioEvent::CustomDataTransmitted(byte));

        self.tx_buffer.put_u8(byte);
        trace!("mote {}: tx byte {:#04x} ({} buffered)", self.id, byte, self.tx_buffer.len());

        if self.tx_buffer.len() == PHY_HEADER_LEN {
            self.tx_expected_len = Some(byte as usize + PHY_HEADER_LEN);
        }
        if self.tx_expected_len == Some(self.tx_buffer.len()) {
            self.finish_frame();
        }
        Ok(())
    }

    fn finish_frame(&mut self) {
        let ppdu = self.tx_buffer.split().freeze();
        self.tx_expected_len = None;

        let packet = match framing::decode(&ppdu) {
            Ok(converted) => {
                if converted.is_malformed() {
                    debug!("mote {}: malformed frame transmitted, raw {:02x?}", self.id, converted.raw.as_ref());
                }
                converted.packet
            }
            Err(e) => {
                warn!("mote {}: {}", self.id, e);
                RadioPacket::empty()
            }
        };

        debug!("mote {}: packet transmitted ({} bytes)", self.id, packet.len());
        self.complete_transmission(packet);
    }

    /// Ends the frame in progress with an empty packet.
    pub(crate) fn abort_transmission(&mut self) {
        if !self.tx_buffer.is_empty() {
            debug!("mote {}: discarding {} buffered tx bytes", self.id, self.tx_buffer.len());
        }
        self.tx_buffer.clear();
        self.tx_expected_len = None;
        self.complete_transmission(RadioPacket::empty());
    }

    fn complete_transmission(&mut self, packet: RadioPacket) {
        self.last_outgoing_packet = Some(packet.clone());
        self.emit(RadioEvent::PacketTransmitted(packet));
        self.enter(LinkState::Idle);
        self.emit(RadioEvent::TransmissionFinished);
    }
}
