//! Bounded frame hand-off between the loader (producer) and the animator (consumer).
//!
//! A crossbeam bounded channel plus a cancel channel. Cancelling drops the cancel
//! sender, which makes every blocked `push`/`pop` wake at once instead of waiting
//! out its timeout.

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, select};

use crate::entities::Frame;

/// Fixed queue capacity.
pub const FRAME_QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// No slot freed up in time; the frame was dropped.
    TimedOut,
    Cancelled,
}

pub struct BoundedFrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
}

impl Default for BoundedFrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedFrameQueue {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let (cancel_tx, cancel_rx) = bounded(0);
        Self {
            tx,
            rx,
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
        }
    }

    /// Push, waiting at most `timeout` for a free slot.
    pub fn push(&self, frame: Frame, timeout: Duration) -> PushOutcome {
        if self.is_cancelled() {
            return PushOutcome::Cancelled;
        }
        select! {
            send(self.tx, frame) -> res => match res {
                Ok(()) => PushOutcome::Pushed,
                Err(_) => PushOutcome::Cancelled,
            },
            recv(self.cancel_rx) -> _ => PushOutcome::Cancelled,
            default(timeout) => PushOutcome::TimedOut,
        }
    }

    /// Block until a frame arrives. `None` once cancelled.
    pub fn pop(&self) -> Option<Frame> {
        if self.is_cancelled() {
            return None;
        }
        select! {
            recv(self.rx) -> frame => frame.ok(),
            recv(self.cancel_rx) -> _ => None,
        }
    }

    pub fn try_pop(&self) -> Option<Frame> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Wake all blocked callers and refuse further traffic. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Sleep up to `timeout`; returns true as soon as the queue is cancelled.
    pub fn wait_cancelled(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        matches!(self.cancel_rx.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cancel_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(FRAME_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Bitmap;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn frame(index: usize) -> Frame {
        Frame::new(Bitmap::solid(1, 1, [index as u8, 0, 0, 255]), index)
    }

    #[test]
    fn test_capacity_and_timeout() {
        let queue = BoundedFrameQueue::new();
        assert_eq!(queue.capacity(), FRAME_QUEUE_CAPACITY);
        for i in 0..FRAME_QUEUE_CAPACITY {
            assert_eq!(queue.push(frame(i), Duration::ZERO), PushOutcome::Pushed);
        }
        assert!(queue.is_full());

        let started = Instant::now();
        assert_eq!(queue.push(frame(99), Duration::from_millis(30)), PushOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(25));
        assert_eq!(queue.len(), FRAME_QUEUE_CAPACITY);
    }

    #[test]
    fn test_cancel_wakes_blocked_push() {
        let queue = Arc::new(BoundedFrameQueue::with_capacity(1));
        queue.push(frame(0), Duration::ZERO);

        let q = Arc::clone(&queue);
        let producer = thread::spawn(move || {
            let started = Instant::now();
            let outcome = q.push(frame(1), Duration::from_secs(10));
            (outcome, started.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        queue.cancel();
        let (outcome, waited) = producer.join().unwrap();
        assert_eq!(outcome, PushOutcome::Cancelled);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_wakes_blocked_pop() {
        let queue = Arc::new(BoundedFrameQueue::new());
        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || q.pop());

        thread::sleep(Duration::from_millis(20));
        queue.cancel();
        assert!(consumer.join().unwrap().is_none());
        assert!(queue.is_cancelled());
        assert_eq!(queue.push(frame(0), Duration::ZERO), PushOutcome::Cancelled);
    }

    #[test]
    fn test_wait_cancelled() {
        let queue = Arc::new(BoundedFrameQueue::new());
        assert!(!queue.wait_cancelled(Duration::from_millis(5)));

        let q = Arc::clone(&queue);
        let waiter = thread::spawn(move || q.wait_cancelled(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        queue.cancel();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_concurrent_occupancy_bound() {
        let queue = Arc::new(BoundedFrameQueue::new());
        let q = Arc::clone(&queue);
        let producer = thread::spawn(move || {
            for i in 0..200 {
                while q.push(frame(i), Duration::from_millis(50)) != PushOutcome::Pushed {}
                assert!(q.len() <= FRAME_QUEUE_CAPACITY);
            }
        });

        let mut received = Vec::new();
        while received.len() < 200 {
            assert!(queue.len() <= FRAME_QUEUE_CAPACITY);
            if let Some(f) = queue.pop() {
                received.push(f.index);
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push,
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn test_fifo_and_bound(ops in proptest::collection::vec(op(), 0..64)) {
            let queue = BoundedFrameQueue::new();
            let mut model = VecDeque::new();
            let mut next = 0usize;

            for op in ops {
                match op {
                    Op::Push => {
                        let outcome = queue.push(frame(next), Duration::ZERO);
                        if model.len() < FRAME_QUEUE_CAPACITY {
                            prop_assert_eq!(outcome, PushOutcome::Pushed);
                            model.push_back(next);
                        } else {
                            prop_assert_eq!(outcome, PushOutcome::TimedOut);
                        }
                        next += 1;
                    }
                    Op::Pop => {
                        prop_assert_eq!(queue.try_pop().map(|f| f.index), model.pop_front());
                    }
                }
                prop_assert!(queue.len() <= FRAME_QUEUE_CAPACITY);
                prop_assert_eq!(queue.len(), model.len());
            }
        }
    }
}
