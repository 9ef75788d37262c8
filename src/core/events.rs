//! Notifications fired by an image view.
//!
//! All of them are emitted on the apply thread.

use uuid::Uuid;

use crate::entities::Bitmap;

/// `state` value carried by load notifications for multi-frame playback.
pub const LOAD_STATE_IMAGES: &str = "images";

#[derive(Debug, Clone)]
pub enum ViewEvent {
    /// Playback began.
    Started { view: Uuid },
    /// Playback ended (explicit stop).
    Stopped { view: Uuid },
    /// A frame was just displayed.
    FrameChanged { view: Uuid, index: usize },
    /// The frame buffer filled up for the first time this run.
    Loaded { view: Uuid, state: &'static str },
    /// A new bitmap was published to the surface.
    BitmapChanged { view: Uuid, width: u32, height: u32 },
}

impl ViewEvent {
    pub fn view(&self) -> Uuid {
        match self {
            ViewEvent::Started { view }
            | ViewEvent::Stopped { view }
            | ViewEvent::FrameChanged { view, .. }
            | ViewEvent::Loaded { view, .. }
            | ViewEvent::BitmapChanged { view, .. } => *view,
        }
    }

    /// Binding-layer event name.
    pub fn name(&self) -> &'static str {
        match self {
            ViewEvent::Started { .. } => "start",
            ViewEvent::Stopped { .. } => "stop",
            ViewEvent::FrameChanged { .. } => "change",
            ViewEvent::Loaded { .. } => "load",
            ViewEvent::BitmapChanged { .. } => "bitmapchanged",
        }
    }

    pub(crate) fn bitmap_changed(view: Uuid, bitmap: &Bitmap) -> Self {
        ViewEvent::BitmapChanged {
            view,
            width: bitmap.width(),
            height: bitmap.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_view() {
        let id = Uuid::new_v4();
        let change = ViewEvent::FrameChanged { view: id, index: 2 };
        assert_eq!(change.name(), "change");
        assert_eq!(change.view(), id);
        assert_eq!(
            ViewEvent::Loaded { view: id, state: LOAD_STATE_IMAGES }.name(),
            "load"
        );
    }
}
