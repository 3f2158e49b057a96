//! Deterministic multi-mote simulation around the transceiver core

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use emu802154_core::{ChipKind, MoteId, SimTime};
use emu802154_radio::{framing, EventQueue, Notification, RadioEvent, RadioTask, Scheduler, Transceiver};
use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::chip::FirmwareChip;
use crate::medium::{BroadcastMedium, MediumStats};
use crate::trace::{Direction, Trace, TraceRecord};
use crate::SimulationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Radio { mote: MoteId, task: RadioTask },
    /// Firmware on `mote` starts loading its next frame.
    StartFrame { mote: MoteId },
    /// The chip on `mote` shifts its next octet out to the transceiver.
    ShiftOut { mote: MoteId },
    /// Watchdog reset: the chip drops its ready-to-receive line and raises it again.
    PowerCycle { mote: MoteId },
}

pub type SimQueue = Rc<RefCell<EventQueue<SimEvent>>>;

/// Notifications from all transceivers, tagged with their source.
pub type Inbox = Rc<RefCell<VecDeque<(MoteId, RadioEvent)>>>;

/// Hands a transceiver's deferred work to the shared simulation queue.
pub struct MoteScheduler {
    queue: SimQueue,
    mote: MoteId,
}

impl Scheduler for MoteScheduler {
    fn now(&self) -> SimTime {
        self.queue.borrow().now()
    }

    fn schedule(&self, at: SimTime, task: RadioTask) {
        self.queue.borrow_mut().push(at, SimEvent::Radio { mote: self.mote, task });
    }
}

pub type MoteRadio = Transceiver<FirmwareChip, MoteScheduler>;

pub struct Mote {
    pub radio: MoteRadio,
    packets_left: u32,
    next_seq: u16,
}

impl Mote {
    pub fn id(&self) -> MoteId {
        self.radio.id()
    }

    pub fn packets_left(&self) -> u32 {
        self.packets_left
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SimulationReport {
    pub end_time: SimTime,
    pub events_dispatched: u64,
    pub frames_queued: u64,
    pub frames_received: usize,
    pub fcs_errors: usize,
    pub bytes_skipped: usize,
    pub medium: MediumStats,
}

pub struct Simulation {
    config: SimulationConfig,
    queue: SimQueue,
    motes: BTreeMap<MoteId, Mote>,
    medium: BroadcastMedium,
    inbox: Inbox,
    trace: Trace,
    frames_queued: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let queue: SimQueue = Rc::new(RefCell::new(EventQueue::new()));
        let inbox: Inbox = Rc::new(RefCell::new(VecDeque::new()));
        let medium = BroadcastMedium::new(&config)?;

        let mut motes = BTreeMap::new();
        for index in 0..config.motes {
            let id = index + 1;
            let kind = config
                .chip_kinds
                .get(index as usize % config.chip_kinds.len().max(1))
                .cloned()
                .unwrap_or(ChipKind::Cc2420);
            let scheduler = MoteScheduler {
                queue: queue.clone(),
                mote: id,
            };
            let mut radio = Transceiver::with_config(id, config.radio.clone(), FirmwareChip::new(kind), scheduler)?;

            let sink = inbox.clone();
            radio.subscribe(move |n: &Notification| sink.borrow_mut().push_back((id, n.event.clone())));
            radio.set_hardware_ready(true);
            radio.set_channel(config.channel);

            // spread first transmissions over one send interval
            let offset = config.send_interval * index as SimTime / config.motes.max(1) as SimTime;
            queue.borrow_mut().push(offset, SimEvent::StartFrame { mote: id });

            motes.insert(
                id,
                Mote {
                    radio,
                    packets_left: config.packets_per_mote,
                    next_seq: 0,
                },
            );
        }

        info!("simulation initialized with {} motes: {:?}", motes.len(), config);

        let mut sim = Self {
            config,
            queue,
            motes,
            medium,
            inbox,
            trace: Trace::default(),
            frames_queued: 0,
        };
        sim.settle();
        Ok(sim)
    }

    pub fn now(&self) -> SimTime {
        self.queue.borrow().now()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn mote(&self, id: MoteId) -> Option<&Mote> {
        self.motes.get(&id)
    }

    pub fn mote_mut(&mut self, id: MoteId) -> Option<&mut Mote> {
        self.motes.get_mut(&id)
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Schedules a watchdog-style power cycle of `mote` at `at`.
    pub fn schedule_power_cycle(&mut self, mote: MoteId, at: SimTime) {
        self.queue.borrow_mut().push(at, SimEvent::PowerCycle { mote });
    }

    pub fn is_finished(&self) -> bool {
        match self.queue.borrow().peek_time() {
            Some(at) => at > self.config.duration,
            None => true,
        }
    }

    /// Dispatches the next due event. Returns false once the run is over.
    pub fn step(&mut self) -> bool {
        let next = self.queue.borrow_mut().pop_until(self.config.duration);
        let Some((at, event)) = next else {
            return false;
        };
        trace!("{} us: {:?}", at, event);

        match event {
            SimEvent::Radio { mote, task } => {
                if let Some(m) = self.motes.get_mut(&mote) {
                    m.radio.fire(task);
                }
            }
            SimEvent::StartFrame { mote } => self.start_frame(mote, at),
            SimEvent::ShiftOut { mote } => self.shift_out(mote, at),
            SimEvent::PowerCycle { mote } => {
                if let Some(m) = self.motes.get_mut(&mote) {
                    debug!("mote {}: power cycle", mote);
                    m.radio.set_hardware_ready(false);
                    m.radio.chip_mut().flush_tx();
                    m.radio.set_hardware_ready(true);
                }
            }
        }

        self.settle();
        self.collect_frames(at);
        true
    }

    pub fn run(&mut self) -> SimulationReport {
        while self.step() {}
        self.report()
    }

    /// Like `run`, but sleeps between events so simulated time passes
    /// `speed` times faster than wall-clock time.
    pub async fn run_paced(&mut self, speed: f64) -> SimulationReport {
        let mut last = self.now();
        loop {
            let next = self.queue.borrow().peek_time();
            let Some(at) = next.filter(|&at| at <= self.config.duration) else {
                break;
            };
            let real_us = (at.saturating_sub(last)) as f64 / speed.max(f64::MIN_POSITIVE);
            if real_us >= 1.0 {
                tokio::time::sleep(Duration::from_micros(real_us as u64)).await;
            }
            last = at;
            self.step();
        }
        self.report()
    }

    pub fn report(&self) -> SimulationReport {
        let mut report = SimulationReport {
            end_time: self.now(),
            events_dispatched: self.queue.borrow().stats().events_dispatched,
            frames_queued: self.frames_queued,
            medium: self.medium.stats().clone(),
            ..Default::default()
        };
        for mote in self.motes.values() {
            let chip = mote.radio.chip();
            report.frames_received += chip.frames_received;
            report.fcs_errors += chip.fcs_errors;
            report.bytes_skipped += chip.bytes_skipped();
        }
        report
    }

    /// Lets the medium react to every pending notification, including the
    /// ones its own reactions cause.
    fn settle(&mut self) {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some((from, event)) = next else { break };
            self.medium.handle(from, &event, &mut self.motes, &mut self.trace);
        }
    }

    fn start_frame(&mut self, id: MoteId, at: SimTime) {
        let Some(mote) = self.motes.get_mut(&id) else { return };
        if mote.packets_left == 0 {
            return;
        }

        let seq = mote.next_seq;
        let mut payload = Vec::with_capacity(self.config.payload_len);
        payload.extend_from_slice(&id.to_le_bytes());
        payload.extend_from_slice(&seq.to_le_bytes());
        payload.resize(self.config.payload_len, (seq & 0xff) as u8);

        match framing::encode(&payload) {
            Ok(ppdu) => {
                mote.radio.chip_mut().load_frame(&ppdu);
                mote.packets_left -= 1;
                mote.next_seq = mote.next_seq.wrapping_add(1);
                self.frames_queued += 1;
                self.queue.borrow_mut().push(at, SimEvent::ShiftOut { mote: id });
            }
            Err(e) => {
                warn!("mote {}: giving up on its remaining frames: {}", id, e);
                mote.packets_left = 0;
            }
        }

        if mote.packets_left > 0 {
            self.queue
                .borrow_mut()
                .push(at + self.config.send_interval, SimEvent::StartFrame { mote: id });
        }
    }

    fn shift_out(&mut self, id: MoteId, at: SimTime) {
        let Some(mote) = self.motes.get_mut(&id) else { return };
        let Some(byte) = mote.radio.chip_mut().shift_out() else { return };

        if let Err(e) = mote.radio.accept_tx_byte(byte) {
            debug!("mote {}: {}", id, e);
        }
        if mote.radio.chip().has_pending_tx() {
            let next = at + self.config.radio.inter_byte_delay();
            self.queue.borrow_mut().push(next, SimEvent::ShiftOut { mote: id });
        }
    }

    fn collect_frames(&mut self, at: SimTime) {
        for (&id, mote) in self.motes.iter_mut() {
            for frame in mote.radio.chip_mut().take_frames() {
                self.trace.push(TraceRecord {
                    time: at,
                    mote: id,
                    direction: Direction::Rx,
                    ppdu: reframe(&frame.raw),
                });
            }
        }
    }
}

/// PHY header in front of a received raw frame, so rx and tx trace entries
/// share a layout.
fn reframe(raw: &[u8]) -> Vec<u8> {
    let mut ppdu = vec![0u8; framing::PREAMBLE_LEN];
    ppdu.push(framing::SFD);
    ppdu.push(raw.len() as u8);
    ppdu.extend_from_slice(raw);
    ppdu
}

#[cfg(test)]
mod tests {
    use emu802154_core::MILLISECOND;
    use emu802154_radio::LinkState;

    use super::*;

    fn small(motes: u32, kinds: Vec<ChipKind>) -> SimulationConfig {
        SimulationConfig {
            motes,
            chip_kinds: kinds,
            packets_per_mote: 3,
            payload_len: 10,
            send_interval: 10 * MILLISECOND,
            duration: 100 * MILLISECOND,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_kind_motes_exchange_frames() {
        let mut sim = Simulation::new(small(2, vec![ChipKind::Cc2420])).unwrap();
        let report = sim.run();

        assert_eq!(report.frames_queued, 6);
        assert_eq!(report.medium.transmissions, 6);
        // every frame reaches the one other mote
        assert_eq!(report.frames_received, 6);
        assert_eq!(report.fcs_errors, 0);
        assert!(report.medium.bytes_forwarded > 0);
        assert_eq!(report.medium.packets_delivered, 0);
    }

    #[test]
    fn test_mixed_kinds_use_packet_delivery() {
        let mut sim = Simulation::new(small(2, vec![ChipKind::Cc2420, ChipKind::AtRfa1])).unwrap();
        let report = sim.run();

        assert_eq!(report.medium.bytes_forwarded, 0);
        assert_eq!(report.medium.packets_delivered, 6);
        assert_eq!(report.frames_received, 6);

        let last = sim.mote(2).unwrap().radio.last_packet_received().unwrap();
        assert_eq!(&last.data()[..4], &1u32.to_le_bytes());
    }

    #[test]
    fn test_oversized_payload_config_refused() {
        let mut config = small(1, vec![ChipKind::Cc2420]);
        config.payload_len = 200;
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn test_unencodable_frame_stops_mote() {
        let mut config = small(1, vec![ChipKind::Cc2420]);
        config.send_interval = 0;
        config.duration = 10;
        let mut sim = Simulation::new(config).unwrap();
        sim.config.payload_len = 200;

        let report = sim.run();
        assert_eq!(report.frames_queued, 0);
        assert_eq!(report.events_dispatched, 1);
        assert_eq!(sim.mote(1).unwrap().packets_left(), 0);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let mut config = small(4, vec![ChipKind::Cc2420, ChipKind::AtRfa1]);
        config.packet_loss = 0.3;
        config.rssi_std_dev = 5.0;
        config.seed = 42;

        let first = Simulation::new(config.clone()).unwrap().run();
        let second = Simulation::new(config).unwrap().run();
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn test_power_cycle_mid_transmission_aborts_frame() {
        let mut sim = Simulation::new(small(2, vec![ChipKind::Cc2420])).unwrap();
        // mote 1 shifts out its first frame from t=0, four octets are out by t=100
        sim.schedule_power_cycle(1, 100);
        let report = sim.run();

        let aborted = sim
            .trace()
            .records()
            .iter()
            .find(|r| r.mote == 1 && r.direction == Direction::Tx)
            .unwrap();
        assert_eq!(aborted.ppdu, vec![0, 0, 0, 0]);
        assert_eq!(sim.mote(1).unwrap().radio.state(), LinkState::Idle);
        assert_eq!(report.medium.transmissions, 6);
        assert_eq!(report.frames_received, 5);
        assert_eq!(report.bytes_skipped, 4);
    }

    #[test]
    fn test_trace_records_both_directions() {
        let mut sim = Simulation::new(small(2, vec![ChipKind::Cc2420])).unwrap();
        sim.run();

        let tx = sim.trace().records().iter().filter(|r| r.direction == Direction::Tx).count();
        let rx = sim.trace().records().iter().filter(|r| r.direction == Direction::Rx).count();
        assert_eq!(tx, 6);
        assert_eq!(rx, 6);
        let first_tx = sim.trace().records().iter().find(|r| r.direction == Direction::Tx).unwrap();
        let first_rx = sim.trace().records().iter().find(|r| r.direction == Direction::Rx).unwrap();
        assert_eq!(first_tx.ppdu, first_rx.ppdu);
    }

    #[tokio::test]
    async fn test_paced_run_matches_unpaced() {
        let config = small(2, vec![ChipKind::Cc2420]);
        let unpaced = Simulation::new(config.clone()).unwrap().run();
        let paced = Simulation::new(config).unwrap().run_paced(1_000_000.0).await;
        assert_eq!(paced.frames_received, unpaced.frames_received);
        assert_eq!(paced.events_dispatched, unpaced.events_dispatched);
    }
}
