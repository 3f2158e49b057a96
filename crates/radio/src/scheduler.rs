//! Discrete-event scheduling for byte delivery and RSSI averaging

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use emu802154_core::SimTime;
use log::{trace, warn};

/// Work a transceiver defers to a later simulated time. The clock hands the
/// task back through `Transceiver::fire` when it comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioTask {
    /// One octet of a received PPDU; `last` marks the final octet of its packet.
    DeliverByte { byte: u8, last: bool },
    /// One step of the RSSI moving average.
    RssiUpdate,
}

/// The discrete-event clock a transceiver is wired to.
pub trait Scheduler {
    fn now(&self) -> SimTime;
    fn schedule(&self, at: SimTime, task: RadioTask);
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn now(&self) -> SimTime {
        (**self).now()
    }

    fn schedule(&self, at: SimTime, task: RadioTask) {
        (**self).schedule(at, task)
    }
}

struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on (time, insertion order)
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl<E> Eq for Scheduled<E> {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub events_scheduled: u64,
    pub events_dispatched: u64,
    pub events_late: u64,
}

/// Deterministic event queue. Events fire in time order; events sharing a
/// timestamp fire in the order they were scheduled.
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    now: SimTime,
    next_seq: u64,
    stats: QueueStats,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            now: 0,
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queues `event` at `at`. Times already in the past are moved up to now.
    pub fn push(&mut self, at: SimTime, event: E) {
        let at = if at < self.now {
            warn!("event scheduled {} us in the past, firing it now", self.now - at);
            self.stats.events_late += 1;
            self.now
        } else {
            at
        };

        self.heap.push(Scheduled {
            at,
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
        self.stats.events_scheduled += 1;
    }

    /// Removes the earliest event and advances the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        let next = self.heap.pop()?;
        self.now = next.at;
        self.stats.events_dispatched += 1;
        trace!("dispatching event at {} us ({} pending)", next.at, self.heap.len());
        Some((next.at, next.event))
    }

    /// Pops the next event only if it is due at or before `deadline`.
    pub fn pop_until(&mut self, deadline: SimTime) -> Option<(SimTime, E)> {
        match self.peek_time() {
            Some(at) if at <= deadline => self.pop(),
            _ => None,
        }
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.at)
    }

    /// Moves the clock forward without dispatching anything.
    pub fn advance_to(&mut self, at: SimTime) {
        if at > self.now {
            self.now = at;
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

/// A queue of bare radio tasks, for wiring a single transceiver to a clock.
pub type SharedQueue = Rc<RefCell<EventQueue<RadioTask>>>;

impl Scheduler for RefCell<EventQueue<RadioTask>> {
    fn now(&self) -> SimTime {
        self.borrow().now()
    }

    fn schedule(&self, at: SimTime, task: RadioTask) {
        self.borrow_mut().push(at, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_ordering() {
        let mut queue = EventQueue::new();
        queue.push(30, "c");
        queue.push(10, "a");
        queue.push(20, "b");

        assert_eq!(queue.pop(), Some((10, "a")));
        assert_eq!(queue.now(), 10);
        assert_eq!(queue.pop(), Some((20, "b")));
        assert_eq!(queue.pop(), Some((30, "c")));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.now(), 30);
    }

    #[test]
    fn test_equal_times_are_fifo() {
        let mut queue = EventQueue::new();
        for i in 0..10 {
            queue.push(5, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|(_, e)| e).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_past_events_clamped_to_now() {
        let mut queue = EventQueue::new();
        queue.push(100, 1);
        queue.pop();
        queue.push(40, 2);

        assert_eq!(queue.peek_time(), Some(100));
        assert_eq!(queue.stats().events_late, 1);
    }

    #[test]
    fn test_pop_until_respects_deadline() {
        let mut queue = EventQueue::new();
        queue.push(10, 'x');
        queue.push(50, 'y');

        assert_eq!(queue.pop_until(20), Some((10, 'x')));
        assert_eq!(queue.pop_until(20), None);
        assert_eq!(queue.len(), 1);

        queue.advance_to(40);
        assert_eq!(queue.now(), 40);
        let stats = queue.stats();
        assert_eq!(stats.events_scheduled, 2);
        assert_eq!(stats.events_dispatched, 1);
    }

    #[test]
    fn test_shared_queue_as_scheduler() {
        let queue: SharedQueue = Rc::new(RefCell::new(EventQueue::new()));
        queue.schedule(64, RadioTask::RssiUpdate);
        assert_eq!(queue.now(), 0);
        assert_eq!(queue.borrow_mut().pop(), Some((64, RadioTask::RssiUpdate)));
        assert_eq!(Scheduler::now(&queue), 64);
    }
}
