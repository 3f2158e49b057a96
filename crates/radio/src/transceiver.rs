//! One emulated 802.15.4 transceiver, shared by every chip family.

use std::collections::VecDeque;

use bytes::BytesMut;
use emu802154_core::{ChipKind, MoteId, RadioPacket, SimTime};

use crate::chip::ChipAdapter;
use crate::rssi::RssiFilter;
use crate::scheduler::{RadioTask, Scheduler};
use crate::state::{LinkState, ObserverId, Observers, RadioEvent, RadioObserver};
use crate::{RadioConfig, RadioError};

/// Channel a CC2420 comes up on.
pub const DEFAULT_CHANNEL: i32 = 26;

/// Byte-level radio sitting between an emulated chip and the radio medium.
///
/// The chip pushes transmitted octets in through [`Transceiver::accept_tx_byte`];
/// the medium pushes whole packets in through [`Transceiver::deliver`], which
/// are fed back to the chip octet by octet on the scheduler's clock.
pub struct Transceiver<C, S> {
    pub(crate) id: MoteId,
    pub(crate) config: RadioConfig,
    pub(crate) chip: C,
    pub(crate) scheduler: S,
    pub(crate) state: LinkState,
    pub(crate) channel: i32,
    pub(crate) observers: Observers,
    pub(crate) last_event: RadioEvent,

    pub(crate) tx_buffer: BytesMut,
    pub(crate) tx_expected_len: Option<usize>,
    pub(crate) last_outgoing_byte: Option<u8>,
    pub(crate) last_outgoing_packet: Option<RadioPacket>,

    /// Packets whose octets are still queued, oldest first. `None` once
    /// interference destroyed the packet.
    pub(crate) rx_in_flight: VecDeque<Option<RadioPacket>>,
    pub(crate) rx_busy_until: SimTime,
    pub(crate) last_incoming_byte: Option<u8>,
    pub(crate) last_incoming_packet: Option<RadioPacket>,

    pub(crate) rssi: RssiFilter,
}

impl<C: ChipAdapter, S: Scheduler> Transceiver<C, S> {
    pub fn new(id: MoteId, chip: C, scheduler: S) -> Self {
        Self::build(id, RadioConfig::default(), chip, scheduler)
    }

    pub fn with_config(id: MoteId, config: RadioConfig, chip: C, scheduler: S) -> Result<Self, RadioError> {
        config.validate()?;
        Ok(Self::build(id, config, chip, scheduler))
    }

    fn build(id: MoteId, config: RadioConfig, chip: C, scheduler: S) -> Self {
        let capacity = config.tx_buffer_capacity();
        Self {
            id,
            config,
            chip,
            scheduler,
            state: LinkState::Off,
            channel: DEFAULT_CHANNEL,
            observers: Observers::default(),
            last_event: RadioEvent::Unknown,
            tx_buffer: BytesMut::with_capacity(capacity),
            tx_expected_len: None,
            last_outgoing_byte: None,
            last_outgoing_packet: None,
            rx_in_flight: VecDeque::new(),
            rx_busy_until: 0,
            last_incoming_byte: None,
            last_incoming_packet: None,
            rssi: RssiFilter::default(),
        }
    }

    pub fn subscribe(&mut self, observer: impl RadioObserver + 'static) -> ObserverId {
        self.observers.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Runs a task this transceiver scheduled earlier.
    pub fn fire(&mut self, task: RadioTask) {
        match task {
            RadioTask::DeliverByte { byte, last } => self.accept_rx_byte(byte, last),
            RadioTask::RssiUpdate => self.update_rssi_average(),
        }
    }

    pub fn id(&self) -> MoteId {
        self.id
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn channel(&self) -> i32 {
        self.channel
    }

    pub fn is_radio_on(&self) -> bool {
        self.state != LinkState::Off
    }

    pub fn is_transmitting(&self) -> bool {
        self.state == LinkState::Transmitting
    }

    pub fn is_receiving(&self) -> bool {
        self.state == LinkState::Receiving
    }

    pub fn is_interfered(&self) -> bool {
        self.state == LinkState::Interfered
    }

    pub fn last_event(&self) -> &RadioEvent {
        &self.last_event
    }

    pub fn last_packet_transmitted(&self) -> Option<&RadioPacket> {
        self.last_outgoing_packet.as_ref()
    }

    pub fn last_packet_received(&self) -> Option<&RadioPacket> {
        self.last_incoming_packet.as_ref()
    }

    pub fn last_custom_data_transmitted(&self) -> Option<u8> {
        self.last_outgoing_byte
    }

    pub fn last_custom_data_received(&self) -> Option<u8> {
        self.last_incoming_byte
    }

    /// Octets of the frame currently being transmitted.
    pub fn tx_buffered(&self) -> &[u8] {
        &self.tx_buffer
    }

    pub fn current_output_power(&self) -> f64 {
        self.chip.output_power()
    }

    pub fn output_power_indicator(&self) -> u8 {
        self.chip.output_power_indicator()
    }

    pub fn output_power_indicator_max(&self) -> u8 {
        self.chip.output_power_indicator_max()
    }

    pub fn chip_kind(&self) -> ChipKind {
        self.chip.kind()
    }

    /// Raw octets only make sense to a chip of the same family.
    pub fn can_receive_from(&self, kind: &ChipKind) -> bool {
        self.chip.kind() == *kind
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }
}
