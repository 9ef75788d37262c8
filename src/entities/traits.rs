//! Abstract traits for the external collaborators.
//!
//! The engine in `core/` only talks to decoders, display surfaces, response
//! caches and HTTP transports through these seams. Production implementations
//! live in `entities::loader` and `core::net`; tests plug in stubs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use reqwest::Url;
use reqwest::header::HeaderMap;

use super::bitmap::Bitmap;
use super::error::ImageError;
use super::source::ImageSource;

/// Requested output geometry passed through to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeHints {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl SizeHints {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }
}

/// Turns a source into a bitmap, synchronously relative to the caller.
pub trait Decoder: Send + Sync {
    fn decode(&self, source: &ImageSource, hints: SizeHints) -> Result<Bitmap, ImageError>;
}

/// The visual widget. Only ever mutated from the apply thread.
pub trait DisplaySurface: Send + Sync {
    fn set_bitmap(&self, bitmap: Option<Bitmap>);
    fn bitmap(&self) -> Option<Bitmap>;
}

/// Headless surface that just remembers what it shows.
#[derive(Debug, Default)]
pub struct MemorySurface {
    current: Mutex<Option<Bitmap>>,
    updates: AtomicU64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_bitmap` calls so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl DisplaySurface for MemorySurface {
    fn set_bitmap(&self, bitmap: Option<Bitmap>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = bitmap;
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn bitmap(&self) -> Option<Bitmap> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Body and headers of a completed HTTP GET.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type FetchFuture =
    Pin<Box<dyn Future<Output = Result<FetchedResponse, ImageError>> + Send + 'static>>;

/// Async fetch primitive.
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url) -> FetchFuture;
}

/// Shared response cache.
///
/// Which responses are admissible (e.g. `Cache-Control: no-store`) is the
/// cache's decision; the engine only asks and offers.
pub trait ResponseCache: Send + Sync {
    /// Was this URL's response already accepted into the cache?
    fn peek(&self, url: &Url) -> bool;

    fn lookup(&self, url: &Url) -> Option<Bytes>;

    /// Offer a downloaded response. Returns false if the cache rejected it.
    fn offer(&self, url: &Url, response: &FetchedResponse) -> bool;
}
