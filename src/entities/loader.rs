//! Production decoder backed by the `image` crate.
//!
//! Raw bytes come from wherever the source points:
//! - `LocalFile`: read from disk (existence + size checked first)
//! - `OpaqueBlob`: used as-is
//! - `NetworkUrl`: response cache first, otherwise a blocking fetch through the
//!   async transport (only valid off the async runtime, e.g. on a loader thread)
//! - `InlineBitmap`: already decoded, returned unchanged
//!
//! Size hints only ever shrink the result; aspect ratio is preserved.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::FilterType;
use image::DynamicImage;
use log::debug;
use reqwest::Url;

use super::bitmap::Bitmap;
use super::error::ImageError;
use super::source::ImageSource;
use super::traits::{Decoder, ResponseCache, SizeHints, Transport};

const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Network collaborators used for `NetworkUrl` sources.
#[derive(Clone)]
struct NetworkBackend {
    cache: Arc<dyn ResponseCache>,
    transport: Arc<dyn Transport>,
    runtime: tokio::runtime::Handle,
}

/// Decoder for every source kind.
pub struct ImageDecoder {
    network: Option<NetworkBackend>,
    max_file_size: u64,
    filter: FilterType,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder {
    /// Local-only decoder: network sources fail with `InvalidSource`.
    pub fn new() -> Self {
        Self {
            network: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            filter: FilterType::Triangle,
        }
    }

    pub fn with_network(
        mut self,
        cache: Arc<dyn ResponseCache>,
        transport: Arc<dyn Transport>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        self.network = Some(NetworkBackend {
            cache,
            transport,
            runtime,
        });
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Decode already-loaded bytes, applying size hints.
    pub fn decode_bytes(&self, bytes: &[u8], hints: SizeHints) -> Result<Bitmap, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("empty image data".to_string()));
        }
        let img = image::load_from_memory(bytes)?;
        Ok(Bitmap::from_dynamic(self.fit(img, hints)))
    }

    fn fit(&self, img: DynamicImage, hints: SizeHints) -> DynamicImage {
        let (w, h) = (img.width(), img.height());
        let max_w = hints.width.filter(|v| *v > 0).unwrap_or(w);
        let max_h = hints.height.filter(|v| *v > 0).unwrap_or(h);
        if w <= max_w && h <= max_h {
            return img;
        }
        debug!("Downscaling {}x{} to fit {}x{}", w, h, max_w, max_h);
        img.resize(max_w, max_h, self.filter)
    }

    fn load_file(&self, path: &Path) -> Result<Vec<u8>, ImageError> {
        debug!("Reading image file: {}", path.display());

        let metadata = std::fs::metadata(path)
            .map_err(|e| ImageError::FileSystem(format!("{}: {}", path.display(), e)))?;
        if metadata.len() > self.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "{} is {} bytes (limit {})",
                path.display(),
                metadata.len(),
                self.max_file_size
            )));
        }

        std::fs::read(path).map_err(|e| ImageError::FileSystem(format!("{}: {}", path.display(), e)))
    }

    fn load_url(&self, raw: &str) -> Result<Bytes, ImageError> {
        let url = Url::parse(raw).map_err(|e| ImageError::InvalidSource(format!("{}: {}", raw, e)))?;
        let net = self
            .network
            .as_ref()
            .ok_or_else(|| ImageError::InvalidSource(format!("no network backend for {}", url)))?;

        if let Some(bytes) = net.cache.lookup(&url) {
            debug!("Response cache hit: {}", url);
            return Ok(bytes);
        }

        // Handle::block_on panics on a runtime thread; refuse instead.
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ImageError::InvalidSource(format!(
                "blocking fetch of {} attempted on the async runtime",
                url
            )));
        }

        debug!("Blocking fetch: {}", url);
        let response = net.runtime.block_on(net.transport.get(&url))?;
        if !net.cache.offer(&url, &response) {
            debug!("Response cache declined {}", url);
        }
        Ok(response.body)
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, source: &ImageSource, hints: SizeHints) -> Result<Bitmap, ImageError> {
        match source {
            ImageSource::InlineBitmap(bitmap) => Ok(bitmap.clone()),
            ImageSource::OpaqueBlob(bytes) => self.decode_bytes(bytes, hints),
            ImageSource::LocalFile(path) => {
                let bytes = self.load_file(path)?;
                self.decode_bytes(&bytes, hints)
            }
            ImageSource::NetworkUrl(url) => {
                let bytes = self.load_url(url)?;
                self.decode_bytes(&bytes, hints)
            }
            ImageSource::Empty => Err(ImageError::InvalidSource("empty source".to_string())),
        }
    }
}
