//! View configuration: everything the binding layer can set on an image view.
//!
//! JSON keys are camelCase (`defaultImage`, `repeatCount`, `decodeRetries`).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

use super::source::ImageValue;
use super::traits::SizeHints;

/// Per-frame duration multiplier when `duration` is unset and `images` is set.
pub const FRAME_DURATION_PER_IMAGE_MS: u64 = 33;
/// Duration used for a bare single image.
pub const SINGLE_IMAGE_DURATION_MS: u64 = 100;
pub const DEFAULT_DECODE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageViewConfig {
    /// Multi-frame sequence. Takes precedence over `image`.
    pub images: Option<ImageValue>,
    pub image: Option<ImageValue>,
    /// Deprecated alias for `image`.
    pub url: Option<ImageValue>,
    pub default_image: Option<ImageValue>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Milliseconds per frame.
    pub duration: Option<u64>,
    /// 0, negative or unset: infinite.
    pub repeat_count: Option<i64>,
    pub reverse: bool,
    pub decode_retries: Option<u32>,
}

impl ImageViewConfig {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read view config: {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse view config: {}", path.display()))
    }

    /// Move a legacy `url` into `image` unless `image` is already present.
    pub fn normalize(&mut self) {
        if let Some(url) = self.url.take() {
            warn!("The url property is deprecated, use image instead");
            if self.image.is_none() {
                self.image = Some(url);
            }
        }
    }

    pub fn size_hints(&self) -> SizeHints {
        SizeHints::new(self.width, self.height)
    }

    /// Number of entries in `images` (a scalar counts as one).
    pub fn image_count(&self) -> usize {
        match &self.images {
            Some(ImageValue::List(items)) => items.len(),
            Some(_) => 1,
            None => 0,
        }
    }

    /// Explicit duration, else 33 ms per configured frame, else 100 ms.
    pub fn frame_duration(&self) -> Duration {
        let ms = match self.duration {
            Some(ms) => ms,
            None if self.images.is_some() => FRAME_DURATION_PER_IMAGE_MS * self.image_count() as u64,
            None => SINGLE_IMAGE_DURATION_MS,
        };
        Duration::from_millis(ms)
    }

    /// Frame budget: `None` means infinite.
    pub fn repeat_limit(&self) -> Option<u64> {
        match self.repeat_count {
            Some(n) if n > 0 => Some(n as u64),
            _ => None,
        }
    }

    pub fn max_decode_retries(&self) -> u32 {
        self.decode_retries.unwrap_or(DEFAULT_DECODE_RETRIES)
    }

    /// Fold a single live update into the stored configuration.
    pub fn set(&mut self, property: Property) {
        match property {
            Property::Images(v) => self.images = v,
            Property::Image(v) | Property::Url(v) => self.image = v,
            Property::DefaultImage(v) => self.default_image = v,
            Property::Width(v) => self.width = v,
            Property::Height(v) => self.height = v,
            Property::Duration(v) => self.duration = v,
            Property::RepeatCount(v) => self.repeat_count = v,
            Property::Reverse(v) => self.reverse = v,
            Property::DecodeRetries(v) => self.decode_retries = v,
        }
    }
}

/// Single-key update from the binding layer.
#[derive(Debug, Clone)]
pub enum Property {
    Images(Option<ImageValue>),
    Image(Option<ImageValue>),
    Url(Option<ImageValue>),
    DefaultImage(Option<ImageValue>),
    Width(Option<u32>),
    Height(Option<u32>),
    Duration(Option<u64>),
    RepeatCount(Option<i64>),
    Reverse(bool),
    DecodeRetries(Option<u32>),
}

impl Property {
    pub fn key(&self) -> &'static str {
        match self {
            Property::Images(_) => "images",
            Property::Image(_) => "image",
            Property::Url(_) => "url",
            Property::DefaultImage(_) => "defaultImage",
            Property::Width(_) => "width",
            Property::Height(_) => "height",
            Property::Duration(_) => "duration",
            Property::RepeatCount(_) => "repeatCount",
            Property::Reverse(_) => "reverse",
            Property::DecodeRetries(_) => "decodeRetries",
        }
    }
}
