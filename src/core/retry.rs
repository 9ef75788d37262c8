//! RetryController: bounded re-attempts of a single-source decode.
//!
//! Some decoders fail intermittently on a first attempt for reasons unrelated to
//! the input. Transient failures are retried after a flat delay, scheduled on the
//! apply thread. `max_attempts` caps total attempts, the first one included:
//! with 2, the decoder runs at most twice. The retry budget and the generation both reset on every
//! new source configuration; a retry scheduled under an older generation is
//! skipped when it comes due.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, error, warn};

use super::apply::ApplyThread;
use crate::entities::{Bitmap, Decoder, ImageError, ImageSource, SizeHints};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Another attempt was scheduled (n-th retry).
    Scheduled(u32),
    /// Budget used up; failure logged.
    Exhausted,
    /// Not a transient failure; nothing scheduled.
    Fatal,
}

pub struct RetryController {
    apply: Arc<ApplyThread>,
    delay: Duration,
    used: AtomicU32,
    generation: Arc<AtomicU64>,
}

impl RetryController {
    pub fn new(apply: Arc<ApplyThread>, delay: Duration) -> Self {
        Self {
            apply,
            delay,
            used: AtomicU32::new(0),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn retries_used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    /// Forget the retry budget and drop pending retries.
    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// After a failed attempt at `what`, schedule `attempt` if the error is
    /// transient and budget remains. The failed attempt counts against
    /// `max_attempts`.
    pub fn on_failure<F>(&self, what: &str, err: &ImageError, max_attempts: u32, attempt: F) -> RetryDecision
    where
        F: FnOnce() + Send + 'static,
    {
        if !err.is_transient() {
            warn!("Loading {} failed: {}", what, err);
            return RetryDecision::Fatal;
        }

        let used = self.used.load(Ordering::SeqCst);
        if used.saturating_add(1) >= max_attempts {
            error!("Max retries reached, giving up decoding {}: {}", what, err);
            return RetryDecision::Exhausted;
        }
        let n = used + 1;
        self.used.store(n, Ordering::SeqCst);

        let generation = Arc::clone(&self.generation);
        let scheduled_in = generation.load(Ordering::SeqCst);
        let label = what.to_string();
        self.apply.post_delayed(self.delay, move || {
            if generation.load(Ordering::SeqCst) != scheduled_in {
                debug!("Skipping stale retry for {}", label);
                return;
            }
            debug!("Retrying decode, attempt {}/{}: {}", n + 1, max_attempts, label);
            attempt();
        });
        RetryDecision::Scheduled(n)
    }

    /// Decode `source`, retrying transient failures. The first attempt runs on
    /// the caller's thread; retries run on the apply thread. `on_result` is
    /// called once, with the first bitmap obtained.
    pub fn decode_with_retry<F>(
        self: &Arc<Self>,
        decoder: Arc<dyn Decoder>,
        source: ImageSource,
        hints: SizeHints,
        max_attempts: u32,
        on_result: F,
    ) where
        F: FnOnce(Bitmap) + Send + 'static,
    {
        match decoder.decode(&source, hints) {
            Ok(bitmap) => on_result(bitmap),
            Err(err) => {
                let label = source.describe();
                let this = Arc::clone(self);
                self.on_failure(&label, &err, max_attempts, move || {
                    this.decode_with_retry(decoder, source, hints, max_attempts, on_result)
                });
            }
        }
    }
}
