//! Received signal strength smoothing.
//!
//! A real CC2420 reports the average over the last 8 symbol periods, so a new
//! signal strength reaches the RSSI register over 8 steps rather than at once.

use log::trace;

use crate::chip::ChipAdapter;
use crate::scheduler::{RadioTask, Scheduler};
use crate::transceiver::Transceiver;

pub const RSSI_WINDOW: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct RssiFilter {
    current: f64,
    samples: [f64; RSSI_WINDOW],
    remaining: usize,
}

impl RssiFilter {
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn samples(&self) -> &[f64; RSSI_WINDOW] {
        &self.samples
    }

    pub fn is_running(&self) -> bool {
        self.remaining > 0
    }

    fn push_current(&mut self) -> f64 {
        self.samples.rotate_left(1);
        self.samples[RSSI_WINDOW - 1] = self.current;
        self.samples.iter().sum::<f64>() / RSSI_WINDOW as f64
    }
}

impl<C: ChipAdapter, S: Scheduler> Transceiver<C, S> {
    /// Sets the signal strength currently seen on the channel.
    pub fn report_strength(&mut self, strength: f64) {
        if strength == self.rssi.current {
            return;
        }
        self.rssi.current = strength;

        if !self.rssi.is_running() {
            let now = self.scheduler.now();
            self.scheduler.schedule(now, RadioTask::RssiUpdate);
        }
        self.rssi.remaining = RSSI_WINDOW;
    }

    pub fn current_signal_strength(&self) -> f64 {
        self.rssi.current
    }

    pub fn rssi_filter(&self) -> &RssiFilter {
        &self.rssi
    }

    pub(crate) fn update_rssi_average(&mut self) {
        if !self.rssi.is_running() {
            return;
        }

        let average = self.rssi.push_current();
        trace!("mote {}: rssi average {:.1}", self.id, average);
        self.chip.write_rssi(average as i32);

        self.rssi.remaining -= 1;
        if self.rssi.is_running() {
            let next = self.scheduler.now().saturating_add(self.config.inter_byte_delay() / 2);
            self.scheduler.schedule(next, RadioTask::RssiUpdate);
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

    fn radio() -> (Transceiver<RecordingChip, SharedQueue>, SharedQueue) {
        let queue: SharedQueue = Rc::new(RefCell::new(EventQueue::new()));
        let radio = Transceiver::new(4, RecordingChip::default(), queue.clone());
        (radio, queue)
    }

    fn run(radio: &mut Transceiver<RecordingChip, SharedQueue>, queue: &SharedQueue) -> Vec<u64> {
        let mut times = Vec::new();
        loop {
            let next = queue.borrow_mut().pop();
            let Some((at, task)) = next else { return times };
            times.push(at);
            radio.fire(task);
        }
    }

    #[test]
    fn test_average_converges_over_eight_steps() {
        let (mut radio, queue) = radio();
        radio.report_strength(-80.0);

        let times = run(&mut radio, &queue);
        assert_eq!(times, (0..8).map(|i| i * 16).collect::<Vec<u64>>());
        assert_eq!(
            radio.chip().rssi_writes,
            vec![-10, -20, -30, -40, -50, -60, -70, -80]
        );
        assert!(!radio.rssi_filter().is_running());
        assert_eq!(radio.rssi_filter().samples(), &[-80.0; RSSI_WINDOW]);
    }

    #[test]
    fn test_same_strength_is_ignored() {
        let (mut radio, queue) = radio();
        radio.report_strength(-50.0);
        radio.report_strength(-50.0);
        assert_eq!(queue.borrow().len(), 1);

        radio.report_strength(0.0);
        radio.report_strength(0.0);
        assert_eq!(queue.borrow().len(), 1);
    }

    #[test]
    fn test_initial_zero_is_ignored() {
        let (mut radio, queue) = radio();
        radio.report_strength(0.0);
        assert!(queue.borrow().is_empty());
        assert_eq!(radio.current_signal_strength(), 0.0);
    }

    #[test]
    fn test_new_strength_restarts_countdown() {
        let (mut radio, queue) = radio();
        radio.report_strength(-40.0);
        for _ in 0..3 {
            let (_, task) = queue.borrow_mut().pop().unwrap();
            radio.fire(task);
        }

        radio.report_strength(-80.0);
        assert_eq!(queue.borrow().len(), 1);
        run(&mut radio, &queue);

        assert_eq!(radio.chip().rssi_writes.len(), 3 + 8);
        assert_eq!(&radio.chip().rssi_writes[..3], &[-5, -10, -15]);
        assert_eq!(radio.chip().rssi_writes.last(), Some(&-80));
    }

    #[test]
    fn test_stray_update_ignored() {
        let (mut radio, _queue) = radio();
        radio.fire(RadioTask::RssiUpdate);
        assert!(radio.chip().rssi_writes.is_empty());
    }
}
