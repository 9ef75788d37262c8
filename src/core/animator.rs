//! Animator: fixed-period consumer.
//!
//! Each tick blocks on the queue for one frame (the tick is the pacing, so the
//! dequeue itself waits indefinitely), then publishes it on the apply thread. A
//! cancelled queue or a dropped view ends the loop.

use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use log::{debug, trace};

use super::publisher::Publisher;
use super::queue::BoundedFrameQueue;

pub struct Animator {
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<usize>>>,
}

impl Animator {
    /// Start ticking every `period` (floored at 1 ms) on a thread called `name`.
    pub fn spawn(
        name: String,
        period: Duration,
        queue: Arc<BoundedFrameQueue>,
        publisher: Weak<Publisher>,
    ) -> std::io::Result<Self> {
        let period = period.max(Duration::from_millis(1));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(period, queue, &publisher, &stop_rx))?;

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop scheduling ticks. Does not wait for the thread; a tick already
    /// blocked on the queue ends when the queue is cancelled.
    pub fn cancel(&self) {
        self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_none_or(|h| h.is_finished())
    }

    /// Wait for the thread; returns frames displayed. Only call after cancel
    /// and off the apply thread.
    pub fn join(&self) -> Option<usize> {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        handle.join().ok()
    }
}

fn run(period: Duration, queue: Arc<BoundedFrameQueue>, publisher: &Weak<Publisher>, stop_rx: &Receiver<()>) -> usize {
    let ticker = tick(period);
    let mut shown = 0usize;

    loop {
        select! {
            recv(ticker) -> _ => {}
            recv(stop_rx) -> _ => break,
        }

        let Some(frame) = queue.pop() else {
            trace!("Tick interrupted, queue cancelled");
            break;
        };
        let Some(publisher) = publisher.upgrade() else {
            break;
        };

        trace!("Displaying frame {}", frame.index);
        let q = Arc::clone(&queue);
        if publisher.show_frame(frame, move || !q.is_cancelled()) {
            shown += 1;
        }
    }

    debug!("Animator stopped after {} frames", shown);
    shown
}
