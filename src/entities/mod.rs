//! Entities module - value types and collaborator seams
//!
//! Nothing here spawns threads or holds engine state:
//! - Source descriptors and raw config values (source, config)
//! - Decoded pixels and queue payloads (bitmap, frame)
//! - Traits the engine talks through (traits) and their production decoder (loader)

pub mod bitmap;
pub mod config;
pub mod error;
pub mod frame;
pub mod loader;
pub mod resolver;
pub mod source;
pub mod traits;

pub use bitmap::{Bitmap, ImageBlob};
pub use config::{ImageViewConfig, Property};
pub use error::ImageError;
pub use frame::Frame;
pub use loader::ImageDecoder;
pub use resolver::SourceResolver;
pub use source::{FileHandle, ImageSource, ImageValue, SourceKind};
pub use traits::{
    Decoder, DisplaySurface, FetchFuture, FetchedResponse, MemorySurface, ResponseCache, SizeHints,
    Transport,
};
