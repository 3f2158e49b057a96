//! Broadcast radio medium used by the simulation.
//!
//! Every powered mote on the sender's channel hears every transmission unless
//! a loss roll says otherwise. Raw octets go to radios of the sender's chip
//! family; other radios get the whole packet once it is complete.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use emu802154_core::{MoteId, SimTime};
use emu802154_radio::{LinkState, RadioEvent, Scheduler};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::simulation::Mote;
use crate::trace::{Direction, Trace, TraceRecord};
use crate::SimulationConfig;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MediumStats {
    pub transmissions: u64,
    pub receptions_started: u64,
    pub receptions_lost: u64,
    pub interferences: u64,
    pub bytes_forwarded: u64,
    pub packets_delivered: u64,
}

struct ActiveTransmission {
    started: SimTime,
    receivers: Vec<MoteId>,
    ppdu: Vec<u8>,
}

pub struct BroadcastMedium {
    channel_rssi: Normal<f64>,
    noise_floor: f64,
    packet_loss: f64,
    rng: StdRng,
    active: HashMap<MoteId, ActiveTransmission>,
    stats: MediumStats,
}

impl BroadcastMedium {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let channel_rssi = Normal::new(config.rssi_mean, config.rssi_std_dev)
            .context("invalid RSSI distribution")?;
        Ok(Self {
            channel_rssi,
            noise_floor: config.noise_floor,
            packet_loss: config.packet_loss,
            rng: StdRng::seed_from_u64(config.seed),
            active: HashMap::new(),
            stats: MediumStats::default(),
        })
    }

    pub fn stats(&self) -> &MediumStats {
        &self.stats
    }

    /// Number of transmissions currently on the air.
    pub fn active_transmissions(&self) -> usize {
        self.active.len()
    }

    pub fn handle(&mut self, from: MoteId, event: &RadioEvent, motes: &mut BTreeMap<MoteId, Mote>, trace: &mut Trace) {
        match event {
            RadioEvent::TransmissionStarted => self.start_transmission(from, motes),
            RadioEvent::CustomDataTransmitted(byte) => self.forward_byte(from, *byte, motes),
            RadioEvent::PacketTransmitted(packet) => {
                if packet.is_empty() {
                    trace!("mote {}: empty packet, nothing to deliver", from);
                    return;
                }
                let Some(sender_kind) = motes.get(&from).map(|m| m.radio.chip_kind()) else { return };
                let Some(tx) = self.active.get(&from) else { return };
                for id in &tx.receivers {
                    if let Some(receiver) = motes.get_mut(id) {
                        if !receiver.radio.is_transmitting() && !receiver.radio.can_receive_from(&sender_kind) {
                            receiver.radio.deliver(packet);
                            self.stats.packets_delivered += 1;
                        }
                    }
                }
            }
            RadioEvent::TransmissionFinished => self.finish_transmission(from, motes, trace),
            _ => {}
        }
    }

    fn start_transmission(&mut self, from: MoteId, motes: &mut BTreeMap<MoteId, Mote>) {
        let Some(sender) = motes.get(&from) else { return };
        let channel = sender.radio.channel();
        let started = sender.radio.scheduler().now();
        self.stats.transmissions += 1;

        let mut receivers = Vec::new();
        for (&id, mote) in motes.iter_mut() {
            if id == from || mote.radio.channel() != channel {
                continue;
            }
            match mote.radio.state() {
                LinkState::Receiving | LinkState::Interfered => {
                    debug!("mote {}: transmission from {} collides", id, from);
                    mote.radio.signal_interference(true);
                    self.stats.interferences += 1;
                    receivers.push(id);
                }
                LinkState::Idle => {
                    if self.rng.random::<f64>() < self.packet_loss {
                        trace!("mote {}: misses transmission from {}", id, from);
                        self.stats.receptions_lost += 1;
                        continue;
                    }
                    mote.radio.signal_reception_start();
                    mote.radio.report_strength(self.channel_rssi.sample(&mut self.rng));
                    self.stats.receptions_started += 1;
                    receivers.push(id);
                }
                LinkState::Off | LinkState::Transmitting => {}
            }
        }

        self.active.insert(
            from,
            ActiveTransmission {
                started,
                receivers,
                ppdu: Vec::new(),
            },
        );
    }

    fn forward_byte(&mut self, from: MoteId, byte: u8, motes: &mut BTreeMap<MoteId, Mote>) {
        let Some(sender_kind) = motes.get(&from).map(|m| m.radio.chip_kind()) else { return };
        let Some(tx) = self.active.get_mut(&from) else { return };
        tx.ppdu.push(byte);

        for id in &tx.receivers {
            if let Some(receiver) = motes.get_mut(id) {
                // a radio busy transmitting cannot hear anything
                if !receiver.radio.is_transmitting() && receiver.radio.can_receive_from(&sender_kind) {
                    receiver.radio.receive_custom_data(byte);
                    self.stats.bytes_forwarded += 1;
                }
            }
        }
    }

    fn finish_transmission(&mut self, from: MoteId, motes: &mut BTreeMap<MoteId, Mote>, trace: &mut Trace) {
        let Some(tx) = self.active.remove(&from) else { return };
        trace.push(TraceRecord {
            time: tx.started,
            mote: from,
            direction: Direction::Tx,
            ppdu: tx.ppdu,
        });

        for id in tx.receivers {
            let still_hearing = self.active.values().any(|other| other.receivers.contains(&id));
            if still_hearing {
                continue;
            }
            if let Some(receiver) = motes.get_mut(&id) {
                receiver.radio.signal_reception_end();
                receiver.radio.report_strength(self.noise_floor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use emu802154_core::{ChipKind, MILLISECOND};

    use super::*;
    use crate::Simulation;

    #[test]
    fn test_total_loss_blocks_everything() {
        let config = SimulationConfig {
            motes: 3,
            packets_per_mote: 2,
            packet_loss: 1.0,
            duration: 500 * MILLISECOND,
            ..Default::default()
        };
        let report = Simulation::new(config).unwrap().run();

        assert_eq!(report.medium.transmissions, 6);
        assert_eq!(report.medium.receptions_started, 0);
        assert_eq!(report.medium.receptions_lost, 12);
        assert_eq!(report.frames_received, 0);
    }

    #[test]
    fn test_overlapping_transmissions_interfere() {
        let config = SimulationConfig {
            motes: 3,
            chip_kinds: vec![ChipKind::Cc2420],
            packets_per_mote: 1,
            payload_len: 100,
            // all three start within one frame time of each other
            send_interval: MILLISECOND,
            duration: 50 * MILLISECOND,
            ..Default::default()
        };
        let report = Simulation::new(config).unwrap().run();

        assert_eq!(report.medium.transmissions, 3);
        assert!(report.medium.interferences > 0);
        assert!(report.frames_received < 6);
    }

    #[test]
    fn test_invalid_rssi_spread_rejected() {
        let config = SimulationConfig {
            rssi_std_dev: -1.0,
            ..Default::default()
        };
        assert!(BroadcastMedium::new(&config).is_err());
    }

    #[test]
    fn test_invalid_loss_rejected() {
        let config = SimulationConfig {
            packet_loss: 2.0,
            ..Default::default()
        };
        assert!(BroadcastMedium::new(&config).is_err());
    }

    #[test]
    fn test_receiver_rssi_follows_channel() {
        let config = SimulationConfig {
            motes: 2,
            packets_per_mote: 1,
            rssi_mean: -70.0,
            noise_floor: -100.0,
            duration: 500 * MILLISECOND,
            ..Default::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        sim.run();

        let receiver = sim.mote(2).unwrap();
        assert_eq!(receiver.radio.current_signal_strength(), -100.0);
        assert_eq!(receiver.radio.chip().rssi_register(), -100);
    }
}
