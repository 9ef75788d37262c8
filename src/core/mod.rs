//! Engine modules: apply thread, fetch, retry, frame pipeline, playback
//!
//! Independent of any UI toolkit; a view renders through `DisplaySurface`.

pub mod animator;
pub mod apply;
pub mod event_bus;
pub mod events;
pub mod fetcher;
pub mod frame_loader;
pub mod net;
pub mod playback;
pub mod publisher;
pub mod queue;
pub mod retry;
pub mod signal;
pub mod token;
pub mod view;

// Re-exports for convenience
pub use apply::ApplyThread;
pub use event_bus::EventBus;
pub use events::ViewEvent;
pub use fetcher::{AsyncFetcher, FetchPath};
pub use net::{HttpTransport, MemoryResponseCache};
pub use playback::{PlaybackController, PlaybackState};
pub use retry::{RetryController, RetryDecision};
pub use token::{RequestToken, TokenGuard};
pub use view::{ImageView, ImageViewBuilder};
