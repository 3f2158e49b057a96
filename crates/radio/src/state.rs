//! Link state machine and the notifications it emits.
//!
//! Every transition is announced synchronously: all observers have seen the
//! notification before the call that caused it returns.

use std::cell::RefCell;
use std::rc::Rc;

use emu802154_core::{RadioPacket, SimTime};
use log::{debug, trace, warn};

use crate::chip::ChipAdapter;
use crate::scheduler::Scheduler;
use crate::transceiver::Transceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Off,
    /// Powered, neither sending nor receiving.
    Idle,
    Transmitting,
    Receiving,
    Interfered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Nothing has happened yet.
    Unknown,
    /// Configuration change that leaves the link state alone, e.g. a new channel.
    StateChanged,
    HardwareOn,
    HardwareOff,
    TransmissionStarted,
    TransmissionFinished,
    /// A frame left the radio. Empty when the transmission was cut short.
    PacketTransmitted(RadioPacket),
    /// A single raw octet left the radio.
    CustomDataTransmitted(u8),
    ReceptionStarted,
    ReceptionFinished,
    ReceptionInterfered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub time: SimTime,
    pub event: RadioEvent,
}

pub trait RadioObserver {
    fn notify(&mut self, notification: &Notification);
}

impl<F: FnMut(&Notification)> RadioObserver for F {
    fn notify(&mut self, notification: &Notification) {
        self(notification)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Subscriber list, notified in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    list: Vec<(ObserverId, Box<dyn RadioObserver>)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn RadioObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.list.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.list.len();
        self.list.retain(|(existing, _)| *existing != id);
        self.list.len() != before
    }

    pub(crate) fn notify_all(&mut self, notification: &Notification) {
        for (_, observer) in self.list.iter_mut() {
            observer.notify(notification);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}

/// Observer that keeps every notification it sees. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<Notification>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.entries.borrow().clone()
    }

    pub fn events(&self) -> Vec<RadioEvent> {
        self.entries.borrow().iter().map(|n| n.event.clone()).collect()
    }

    /// Events other than the per-octet `CustomDataTransmitted` ones.
    pub fn frame_events(&self) -> Vec<RadioEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, RadioEvent::CustomDataTransmitted(_)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl RadioObserver for EventLog {
    fn notify(&mut self, notification: &Notification) {
        self.entries.borrow_mut().push(notification.clone());
    }
}

impl<C: ChipAdapter, S: Scheduler> Transceiver<C, S> {
    pub(crate) fn emit(&mut self, event: RadioEvent) {
        let notification = Notification {
            time: self.scheduler.now(),
            event,
        };
        trace!("mote {}: {:?} at {} us", self.id, notification.event, notification.time);
        self.observers.notify_all(&notification);
        self.last_event = notification.event;
    }

    pub(crate) fn enter(&mut self, next: LinkState) {
        if self.state != next {
            debug!("mote {}: {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    /// The chip's ready-to-receive line changed.
    ///
    /// Dropping it mid-transmission ends the frame early: an empty packet is
    /// reported before the radio goes off.
    pub fn set_hardware_ready(&mut self, ready: bool) {
        if ready {
            if self.state == LinkState::Off {
                self.enter(LinkState::Idle);
            }
            self.emit(RadioEvent::HardwareOn);
            return;
        }

        match self.state {
            LinkState::Off => {
                trace!("mote {}: radio already off", self.id);
            }
            LinkState::Transmitting => {
                warn!("mote {}: turning off radio while transmitting, ending packet prematurely", self.id);
                self.abort_transmission();
                self.enter(LinkState::Off);
                self.emit(RadioEvent::HardwareOff);
            }
            LinkState::Idle | LinkState::Receiving | LinkState::Interfered => {
                self.enter(LinkState::Off);
                self.emit(RadioEvent::HardwareOff);
            }
        }
    }

    pub fn set_channel(&mut self, channel: i32) {
        debug!("mote {}: channel {} -> {}", self.id, self.channel, channel);
        self.channel = channel;
        self.emit(RadioEvent::StateChanged);
    }

    /// The medium detected the start of a frame addressed to this radio.
    pub fn signal_reception_start(&mut self) {
        if self.state != LinkState::Idle {
            trace!("mote {}: ignoring reception start while {:?}", self.id, self.state);
            return;
        }
        self.enter(LinkState::Receiving);
        self.chip.start_of_reception();
        self.emit(RadioEvent::ReceptionStarted);
    }

    pub fn signal_reception_end(&mut self) {
        match self.state {
            LinkState::Receiving | LinkState::Interfered => {
                self.enter(LinkState::Idle);
                self.chip.end_of_reception();
                self.emit(RadioEvent::ReceptionFinished);
            }
            _ => trace!("mote {}: ignoring reception end while {:?}", self.id, self.state),
        }
    }

    /// Marks any ongoing reception as destroyed, or lifts that mark.
    pub fn signal_interference(&mut self, active: bool) {
        match (active, self.state) {
            (true, LinkState::Idle | LinkState::Receiving) => {
                self.enter(LinkState::Interfered);
                self.drop_incoming();
                self.emit(RadioEvent::ReceptionInterfered);
            }
            (false, LinkState::Interfered) => {
                self.enter(LinkState::Idle);
                self.emit(RadioEvent::StateChanged);
            }
            (_, state) => trace!("mote {}: ignoring interference={} while {:?}", self.id, active, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::chip::RecordingChip;
    use crate::scheduler::{EventQueue, SharedQueue};

    fn radio() -> (Transceiver<RecordingChip, SharedQueue>, EventLog) {
        let queue: SharedQueue = Rc::new(RefCell::new(EventQueue::new()));
        let mut radio = Transceiver::new(1, RecordingChip::default(), queue);
        let log = EventLog::new();
        radio.subscribe(log.clone());
        (radio, log)
    }

    #[test]
    fn test_power_cycle() {
        let (mut radio, log) = radio();
        assert_eq!(radio.state(), LinkState::Off);

        radio.set_hardware_ready(true);
        assert_eq!(radio.state(), LinkState::Idle);
        assert!(radio.is_radio_on());

        radio.set_hardware_ready(false);
        assert_eq!(radio.state(), LinkState::Off);
        assert_eq!(log.events(), vec![RadioEvent::HardwareOn, RadioEvent::HardwareOff]);

        radio.set_hardware_ready(false);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_reception_cycle() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        log.clear();

        radio.signal_reception_start();
        assert_eq!(radio.state(), LinkState::Receiving);
        assert!(radio.is_receiving());
        radio.signal_reception_end();
        assert_eq!(radio.state(), LinkState::Idle);

        assert_eq!(log.events(), vec![RadioEvent::ReceptionStarted, RadioEvent::ReceptionFinished]);
        assert_eq!(radio.chip().receptions_started, 1);
        assert_eq!(radio.chip().receptions_ended, 1);
    }

    #[test]
    fn test_reception_ignored_while_off() {
        let (mut radio, log) = radio();
        radio.signal_reception_start();
        radio.signal_reception_end();
        assert_eq!(radio.state(), LinkState::Off);
        assert!(log.is_empty());
    }

    #[test]
    fn test_interference_during_reception() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        radio.signal_reception_start();
        radio.signal_interference(true);
        assert_eq!(radio.state(), LinkState::Interfered);
        assert!(radio.is_interfered());

        radio.signal_reception_end();
        assert_eq!(radio.state(), LinkState::Idle);
        assert_eq!(
            log.events(),
            vec![
                RadioEvent::HardwareOn,
                RadioEvent::ReceptionStarted,
                RadioEvent::ReceptionInterfered,
                RadioEvent::ReceptionFinished,
            ]
        );
    }

    #[test]
    fn test_power_off_while_receiving() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        radio.signal_reception_start();
        radio.set_hardware_ready(false);
        assert_eq!(radio.state(), LinkState::Off);
        assert_eq!(log.events().last(), Some(&RadioEvent::HardwareOff));

        radio.set_hardware_ready(true);
        radio.signal_interference(true);
        assert!(radio.is_interfered());
        radio.set_hardware_ready(false);
        assert_eq!(radio.state(), LinkState::Off);
        assert_eq!(log.events().last(), Some(&RadioEvent::HardwareOff));
    }

    #[test]
    fn test_power_on_while_transmitting_keeps_state() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        radio.accept_tx_byte(0).unwrap();
        assert!(radio.is_transmitting());

        radio.set_hardware_ready(true);
        assert!(radio.is_transmitting());
        assert_eq!(radio.tx_buffered(), &[0u8]);
        assert_eq!(log.events().last(), Some(&RadioEvent::HardwareOn));
    }

    #[test]
    fn test_interference_lifted() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        radio.signal_interference(true);
        radio.signal_interference(false);
        assert_eq!(radio.state(), LinkState::Idle);
        assert_eq!(log.events().last(), Some(&RadioEvent::StateChanged));
    }

    #[test]
    fn test_channel_change_keeps_state() {
        let (mut radio, log) = radio();
        radio.set_hardware_ready(true);
        radio.set_channel(15);
        assert_eq!(radio.channel(), 15);
        assert_eq!(radio.state(), LinkState::Idle);
        assert_eq!(radio.last_event(), &RadioEvent::StateChanged);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_observers_notified_in_order_and_removable() {
        let (mut radio, _log) = radio();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = seen.clone();
        let a = radio.subscribe(move |n: &Notification| first.borrow_mut().push(("a", n.event.clone())));
        let second = seen.clone();
        radio.subscribe(move |n: &Notification| second.borrow_mut().push(("b", n.event.clone())));

        radio.set_hardware_ready(true);
        assert!(radio.unsubscribe(a));
        assert!(!radio.unsubscribe(a));
        radio.set_channel(11);

        assert_eq!(
            *seen.borrow(),
            vec![
                ("a", RadioEvent::HardwareOn),
                ("b", RadioEvent::HardwareOn),
                ("b", RadioEvent::StateChanged),
            ]
        );
    }
}
