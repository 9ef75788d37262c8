//! Hand-off from engine threads to the display surface.
//!
//! Owns the surface and event bus of one view, and only touches either from
//! the apply thread. Guarded puts check the request token and swap the bitmap
//! under the token lock; notifications are emitted after the lock is released.

use std::sync::Arc;

use log::trace;
use uuid::Uuid;

use super::apply::ApplyThread;
use super::event_bus::EventBus;
use super::events::ViewEvent;
use super::token::{RequestToken, TokenGuard};
use crate::entities::{Bitmap, DisplaySurface, Frame};

pub struct Publisher {
    view: Uuid,
    surface: Arc<dyn DisplaySurface>,
    apply: Arc<ApplyThread>,
    bus: EventBus,
}

impl Publisher {
    pub fn new(view: Uuid, surface: Arc<dyn DisplaySurface>, apply: Arc<ApplyThread>, bus: EventBus) -> Self {
        Self {
            view,
            surface,
            apply,
            bus,
        }
    }

    pub fn view(&self) -> Uuid {
        self.view
    }

    pub fn apply(&self) -> &Arc<ApplyThread> {
        &self.apply
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current surface content.
    pub fn snapshot(&self) -> Option<Bitmap> {
        self.surface.bitmap()
    }

    /// Unconditional put, waits for the apply thread.
    pub fn show(&self, bitmap: Option<Bitmap>) -> bool {
        let surface = Arc::clone(&self.surface);
        let bus = self.bus.clone();
        let view = self.view;
        self.apply
            .post_blocking(move || {
                let event = bitmap.as_ref().map(|b| ViewEvent::bitmap_changed(view, b));
                surface.set_bitmap(bitmap);
                if let Some(event) = event {
                    bus.emit(event);
                }
            })
            .is_some()
    }

    /// Put `bitmap` only if `token` is still current. Blocks until applied or
    /// discarded; returns whether it was applied.
    pub fn show_if_current(&self, tokens: &Arc<TokenGuard>, token: RequestToken, bitmap: Bitmap) -> bool {
        let surface = Arc::clone(&self.surface);
        let bus = self.bus.clone();
        let tokens = Arc::clone(tokens);
        let view = self.view;
        self.apply
            .post_blocking(move || {
                let event = ViewEvent::bitmap_changed(view, &bitmap);
                let applied = tokens
                    .apply_if_current(token, || surface.set_bitmap(Some(bitmap)))
                    .is_some();
                if applied {
                    bus.emit(event);
                }
                applied
            })
            .unwrap_or(false)
    }

    /// Display an animation frame and fire `change`, unless `live` reports the
    /// session gone by the time the apply thread gets to it.
    pub fn show_frame<F>(&self, frame: Frame, live: F) -> bool
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let surface = Arc::clone(&self.surface);
        let bus = self.bus.clone();
        let view = self.view;
        self.apply
            .post_blocking(move || {
                if !live() {
                    trace!("Dropping frame {} from a stopped session", frame.index);
                    return false;
                }
                let index = frame.index;
                let event = ViewEvent::bitmap_changed(view, &frame.bitmap);
                surface.set_bitmap(Some(frame.bitmap));
                bus.emit(event);
                bus.emit(ViewEvent::FrameChanged { view, index });
                true
            })
            .unwrap_or(false)
    }

    /// Emit a notification on the apply thread and wait for subscribers.
    pub fn notify(&self, event: ViewEvent) {
        let bus = self.bus.clone();
        if self.apply.post_blocking(move || bus.emit(event)).is_none() {
            trace!("Apply thread gone, notification dropped");
        }
    }
}
