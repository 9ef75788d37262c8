//! PlaybackController: start/pause/resume/stop across loader and animator.
//!
//! At most one session per view. A session owns the queue, the pause signal,
//! the producer thread and the animator. A session may be created ahead of
//! `start()` as a prebuffer: producer only, no animator, no `start` event.
//! Stopping cancels all of them without joining, so `stop()` is safe to call
//! from an event callback on the apply thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info};

use super::animator::Animator;
use super::events::ViewEvent;
use super::frame_loader::{FrameLoader, PlaybackParams};
use super::publisher::Publisher;
use super::queue::BoundedFrameQueue;
use super::signal::PauseSignal;
use crate::entities::Decoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

struct Session {
    id: u64,
    params: PlaybackParams,
    queue: Arc<BoundedFrameQueue>,
    signal: Arc<PauseSignal>,
    running: Arc<AtomicBool>,
    /// Set once the animator drains the queue; frames are held until then.
    consuming: Arc<AtomicBool>,
    /// Claimed by `start()`. A session that is not started is a prebuffer.
    started: bool,
    loader: Option<JoinHandle<u64>>,
    animator: Option<Animator>,
}

impl Session {
    fn cancel(&self) {
        self.signal.cancel();
        self.queue.cancel();
        if let Some(animator) = &self.animator {
            animator.cancel();
        }
    }

    fn is_producing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Producing, or still between creation and thread spawn.
    fn is_live(&self) -> bool {
        self.loader.is_none() || self.is_producing()
    }

    fn frame_loader(&self, decoder: Arc<dyn Decoder>, publisher: &Arc<Publisher>) -> FrameLoader {
        FrameLoader::new(
            self.params.clone(),
            decoder,
            Arc::clone(&self.queue),
            Arc::clone(&self.signal),
            Arc::clone(&self.running),
            Arc::downgrade(publisher),
        )
        .consumer(Arc::clone(&self.consuming))
    }
}

struct Inner {
    state: PlaybackState,
    session: Option<Session>,
    sessions_started: u64,
}

impl Inner {
    fn new_session(&mut self, params: PlaybackParams) -> Session {
        self.sessions_started += 1;
        Session {
            id: self.sessions_started,
            params,
            queue: Arc::new(BoundedFrameQueue::new()),
            signal: Arc::new(PauseSignal::new()),
            running: Arc::new(AtomicBool::new(false)),
            consuming: Arc::new(AtomicBool::new(false)),
            started: false,
            loader: None,
            animator: None,
        }
    }
}

pub struct PlaybackController {
    inner: Mutex<Inner>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PlaybackState::Idle,
                session: None,
                sessions_started: 0,
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    /// Producer running and not paused.
    pub fn is_animating(&self) -> bool {
        let inner = self.lock();
        inner.state == PlaybackState::Playing && inner.session.as_ref().is_some_and(Session::is_producing)
    }

    /// Direction of the started session, if any.
    pub fn session_reverse(&self) -> Option<bool> {
        self.lock()
            .session
            .as_ref()
            .filter(|s| s.started)
            .map(|s| s.params.reverse)
    }

    /// Start decoding ahead of `start()`: the producer fills the queue and
    /// fires `load`, then holds frames until an animator consumes them.
    /// Any previous session is dropped without a notification.
    pub fn prebuffer(&self, params: PlaybackParams, decoder: Arc<dyn Decoder>, publisher: &Arc<Publisher>) -> bool {
        if params.sources.is_empty() {
            return false;
        }
        let mut inner = self.lock();
        if let Some(previous) = inner.session.take() {
            debug!("Dropping session {} for a new prebuffer", previous.id);
            previous.cancel();
            if previous.started {
                inner.state = PlaybackState::Stopped;
            }
        }

        let mut session = inner.new_session(params);
        match session.frame_loader(decoder, publisher).spawn(format!("flipbook-loader-{}", session.id)) {
            Ok(handle) => {
                debug!("Prebuffering {} frames in session {}", session.params.sources.len(), session.id);
                session.loader = Some(handle);
                inner.session = Some(session);
                true
            }
            Err(e) => {
                error!("Failed to spawn frame loader: {}", e);
                session.cancel();
                false
            }
        }
    }

    /// Start playback. A paused session resumes, a running one is left alone,
    /// a prebuffer with the same parameters is adopted, anything else
    /// (including a session whose producer already finished) is replaced.
    pub fn start(&self, params: PlaybackParams, decoder: Arc<dyn Decoder>, publisher: &Arc<Publisher>) -> bool {
        if params.sources.is_empty() {
            debug!("Nothing to play");
            return false;
        }

        let id = {
            let mut inner = self.lock();
            if let Some(session) = &inner.session
                && session.started
            {
                match inner.state {
                    PlaybackState::Paused => {
                        session.signal.resume();
                        inner.state = PlaybackState::Playing;
                        return true;
                    }
                    PlaybackState::Playing if session.is_live() => return true,
                    _ => {}
                }
            }

            let adopt = inner
                .session
                .as_ref()
                .is_some_and(|s| !s.started && s.params.same_run(&params));
            if !adopt {
                if let Some(previous) = inner.session.take() {
                    debug!("Replacing session {}", previous.id);
                    previous.cancel();
                }
                let session = inner.new_session(params.clone());
                inner.session = Some(session);
            }
            let Some(session) = inner.session.as_mut() else {
                return false;
            };
            session.started = true;
            let id = session.id;
            inner.state = PlaybackState::Playing;
            id
        };

        info!(
            "Playback {} started: {} frames, {:?}/frame, reverse={}",
            id,
            params.sources.len(),
            params.tick_period(),
            params.reverse
        );
        // The animator starts after `start` is out, so it precedes every `change`.
        publisher.notify(ViewEvent::Started { view: publisher.view() });

        // The Started subscribers may already have stopped this session.
        let mut inner = self.lock();
        let Some(session) = inner.session.as_mut().filter(|s| s.id == id) else {
            return false;
        };
        let spawned = if session.loader.is_some() {
            Ok(())
        } else {
            let loader = session.frame_loader(decoder, publisher);
            loader.spawn(format!("flipbook-loader-{}", id)).map(|handle| {
                session.loader = Some(handle);
            })
        };
        let spawned = spawned.and_then(|()| {
            Animator::spawn(
                format!("flipbook-animator-{}", id),
                params.tick_period(),
                Arc::clone(&session.queue),
                Arc::downgrade(publisher),
            )
        });
        match spawned {
            Ok(animator) => {
                session.animator = Some(animator);
                session.consuming.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!("Failed to spawn playback threads: {}", e);
                session.cancel();
                inner.session = None;
                inner.state = PlaybackState::Stopped;
                false
            }
        }
    }

    pub fn pause(&self) {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Playing {
            return;
        }
        let Some(session) = &inner.session else {
            return;
        };
        session.signal.pause();
        let id = session.id;
        inner.state = PlaybackState::Paused;
        debug!("Playback {} paused", id);
    }

    pub fn resume(&self) {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Paused {
            return;
        }
        let Some(session) = &inner.session else {
            return;
        };
        session.signal.resume();
        let id = session.id;
        inner.state = PlaybackState::Playing;
        debug!("Playback {} resumed", id);
    }

    /// Cancel the session and fire `stop` if it was started. A prebuffer is
    /// discarded silently. No-op without a session.
    pub fn stop(&self, publisher: &Publisher) {
        let Some(session) = self.take(PlaybackState::Stopped) else {
            return;
        };
        if !session.started {
            debug!("Prebuffer {} discarded", session.id);
            return;
        }
        info!("Playback {} stopped", session.id);
        publisher.notify(ViewEvent::Stopped { view: publisher.view() });
    }

    /// Cancel the session without a notification. Returns the session id.
    pub fn teardown(&self, next: PlaybackState) -> Option<u64> {
        self.take(next).map(|s| s.id)
    }

    fn take(&self, next: PlaybackState) -> Option<Session> {
        let mut inner = self.lock();
        let session = inner.session.take()?;
        session.cancel();
        if session.started {
            inner.state = next;
        }
        Some(session)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.teardown(PlaybackState::Stopped);
    }
}
