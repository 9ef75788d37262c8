//! FrameLoader: the producer side of multi-frame playback.
//!
//! One thread per session walks the source list (forward or reverse), decodes
//! each frame and pushes it into the bounded queue. It stops when the frame
//! budget is spent, the session is cancelled, or the owning view is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::events::{LOAD_STATE_IMAGES, ViewEvent};
use super::publisher::Publisher;
use super::queue::{BoundedFrameQueue, PushOutcome};
use super::signal::PauseSignal;
use crate::entities::{Decoder, Frame, ImageSource, SizeHints};

/// Immutable playback parameters, captured when a session is created.
#[derive(Debug, Clone)]
pub struct PlaybackParams {
    pub sources: Arc<Vec<ImageSource>>,
    pub frame_duration: Duration,
    /// Total frames to produce; `None` is infinite.
    pub repeat_limit: Option<u64>,
    pub reverse: bool,
    pub hints: SizeHints,
}

impl PlaybackParams {
    /// Animator period: the frame duration with a 1 ms floor.
    pub fn tick_period(&self) -> Duration {
        self.frame_duration.max(Duration::from_millis(1))
    }

    /// How long a push may wait for a free slot: one full pass of the sources.
    pub fn push_timeout(&self) -> Duration {
        self.tick_period().saturating_mul(self.sources.len().max(1) as u32)
    }

    /// Same sources (by identity) and same timing, order and geometry.
    pub fn same_run(&self, other: &PlaybackParams) -> bool {
        Arc::ptr_eq(&self.sources, &other.sources)
            && self.frame_duration == other.frame_duration
            && self.repeat_limit == other.repeat_limit
            && self.reverse == other.reverse
            && self.hints == other.hints
    }

    /// Index of the `step`-th frame of a pass.
    pub fn index_at(&self, step: usize) -> usize {
        if self.reverse {
            self.sources.len() - 1 - step
        } else {
            step
        }
    }
}

pub struct FrameLoader {
    params: PlaybackParams,
    decoder: Arc<dyn Decoder>,
    queue: Arc<BoundedFrameQueue>,
    signal: Arc<PauseSignal>,
    running: Arc<AtomicBool>,
    consuming: Arc<AtomicBool>,
    publisher: Weak<Publisher>,
}

impl FrameLoader {
    pub fn new(
        params: PlaybackParams,
        decoder: Arc<dyn Decoder>,
        queue: Arc<BoundedFrameQueue>,
        signal: Arc<PauseSignal>,
        running: Arc<AtomicBool>,
        publisher: Weak<Publisher>,
    ) -> Self {
        Self {
            params,
            decoder,
            queue,
            signal,
            running,
            consuming: Arc::new(AtomicBool::new(true)),
            publisher,
        }
    }

    /// Share the session's consumer flag. While it is false a push that times
    /// out is retried instead of dropping the frame.
    pub fn consumer(mut self, consuming: Arc<AtomicBool>) -> Self {
        self.consuming = consuming;
        self
    }

    /// Mark running and start the producer thread.
    pub fn spawn(self, name: String) -> std::io::Result<JoinHandle<u64>> {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        thread::Builder::new().name(name).spawn(move || self.run()).inspect_err(|_| {
            running.store(false, Ordering::SeqCst);
        })
    }

    /// Producer loop. Returns the number of frames produced.
    pub fn run(self) -> u64 {
        let produced = if self.publisher.upgrade().is_none() {
            debug!("Frame loader exiting early, view is gone");
            0
        } else {
            self.produce()
        };
        self.running.store(false, Ordering::SeqCst);
        produced
    }

    fn produce(&self) -> u64 {
        let count = self.params.sources.len();
        if count == 0 {
            return 0;
        }
        let push_timeout = self.params.push_timeout();
        let mut produced: u64 = 0;
        let mut fired_load = false;

        'run: loop {
            let pass_started = Instant::now();
            let mut pushed_this_pass = 0usize;

            for step in 0..count {
                if self.params.repeat_limit.is_some_and(|limit| produced >= limit) {
                    break 'run;
                }
                let index = self.params.index_at(step);

                if !fired_load && self.queue.is_full() {
                    fired_load = true;
                    match self.publisher.upgrade() {
                        Some(publisher) => publisher.notify(ViewEvent::Loaded {
                            view: publisher.view(),
                            state: LOAD_STATE_IMAGES,
                        }),
                        None => break 'run,
                    }
                }

                if self.signal.is_paused() {
                    info!("Pausing");
                    if !self.signal.wait_while_paused() {
                        break 'run;
                    }
                    info!("Waking from pause");
                }

                if self.signal.is_cancelled() || self.queue.is_cancelled() {
                    break 'run;
                }

                let bitmap = match self.decoder.decode(&self.params.sources[index], self.params.hints) {
                    Ok(bitmap) => bitmap,
                    Err(e) => {
                        warn!("Frame {} skipped: {}", index, e);
                        produced += 1;
                        continue;
                    }
                };

                let frame = Frame::new(bitmap, index);
                let outcome = loop {
                    match self.queue.push(frame.clone(), push_timeout) {
                        PushOutcome::TimedOut if !self.consuming.load(Ordering::SeqCst) => {
                            trace!("Frame {} held until playback starts", index);
                        }
                        outcome => break outcome,
                    }
                };
                match outcome {
                    PushOutcome::Pushed => {
                        trace!("Queued frame {}", index);
                        pushed_this_pass += 1;
                    }
                    PushOutcome::TimedOut => warn!("Frame {} dropped, consumer is not keeping up", index),
                    PushOutcome::Cancelled => break 'run,
                }
                produced += 1;
            }

            debug!("Frame pass took {:?}", pass_started.elapsed());

            // Nothing decodable: don't spin, wait a pass worth of time (or cancel).
            if pushed_this_pass == 0 && self.queue.wait_cancelled(push_timeout) {
                break 'run;
            }
        }

        produced
    }
}
