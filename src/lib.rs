//! FLIPBOOK - animated multi-source image display engine
//!
//! Re-exports all modules for use by the binary target.

// Core engine (apply thread, fetch, playback)
pub mod core;

// App modules
pub mod cli;
pub mod entities;
pub mod paths;
pub mod settings;

// Re-export commonly used types from core
pub use core::event_bus::EventBus;
pub use core::events::ViewEvent;
pub use core::view::{ImageView, ImageViewBuilder};

// Re-export entities
pub use entities::{Bitmap, ImageError, ImageSource, ImageValue, ImageViewConfig, Property};
