//! Pause/cancel control shared between a playback session and its producer.
//!
//! Pausing only blocks production: the producer parks in `wait_while_paused`
//! until resumed or cancelled. Cancel is sticky and wakes every waiter.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct State {
    paused: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
pub struct PauseSignal {
    state: Mutex<State>,
    cond: Condvar,
}

impl PauseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = false;
        self.cond.notify_all();
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cancelled = true;
        state.paused = false;
        self.cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cancelled
    }

    /// Block while paused. Returns false if cancelled (before or during the wait).
    pub fn wait_while_paused(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = self
            .cond
            .wait_while(state, |s| s.paused && !s.cancelled)
            .unwrap_or_else(|e| e.into_inner());
        !state.cancelled
    }
}
