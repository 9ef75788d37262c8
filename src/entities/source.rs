//! Image source descriptors and raw configuration values.
//!
//! `ImageValue` is whatever the binding layer hands us (a string, a file handle,
//! a blob, a nested list). `ImageSource` is the normalized, immutable descriptor
//! the engine works with. A new configuration produces new sources; existing
//! ones are never mutated.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::Deserialize;

use super::bitmap::Bitmap;

/// Filesystem-handle value: resolves through its backing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Raw configured image value, before resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum ImageValue {
    Text(String),
    File(FileHandle),
    Blob(Bytes),
    Bitmap(Bitmap),
    List(Vec<ImageValue>),
    Unknown(serde_json::Value),
}

impl From<serde_json::Value> for ImageValue {
    /// JSON mapping: strings stay strings, `{"file": ".."}` is a file handle,
    /// `{"blob": "<base64>"}` is an opaque blob, arrays nest. Anything else
    /// is kept as `Unknown` and later resolves to a placeholder.
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::String(s) => ImageValue::Text(s),
            Value::Array(items) => ImageValue::List(items.into_iter().map(ImageValue::from).collect()),
            Value::Object(map) => {
                if let Some(Value::String(path)) = map.get("file") {
                    return ImageValue::File(FileHandle::new(path));
                }
                if let Some(Value::String(encoded)) = map.get("blob") {
                    match general_purpose::STANDARD.decode(encoded.trim()) {
                        Ok(bytes) => return ImageValue::Blob(Bytes::from(bytes)),
                        Err(e) => log::warn!("Ignoring blob with invalid base64: {}", e),
                    }
                }
                ImageValue::Unknown(Value::Object(map))
            }
            other => ImageValue::Unknown(other),
        }
    }
}

impl From<&str> for ImageValue {
    fn from(s: &str) -> Self {
        ImageValue::Text(s.to_string())
    }
}

impl From<String> for ImageValue {
    fn from(s: String) -> Self {
        ImageValue::Text(s)
    }
}

impl From<Bitmap> for ImageValue {
    fn from(bitmap: Bitmap) -> Self {
        ImageValue::Bitmap(bitmap)
    }
}

impl From<FileHandle> for ImageValue {
    fn from(handle: FileHandle) -> Self {
        ImageValue::File(handle)
    }
}

/// Source kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    InlineBitmap,
    LocalFile,
    NetworkUrl,
    OpaqueBlob,
    Empty,
}

/// Immutable descriptor of one image. Equality is by value, so two sources
/// naming the same URL or file compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    InlineBitmap(Bitmap),
    LocalFile(PathBuf),
    /// Kept unparsed; a malformed URL is handled where it is interpreted.
    NetworkUrl(String),
    OpaqueBlob(Bytes),
    /// Placeholder for values that could not be interpreted.
    Empty,
}

impl ImageSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ImageSource::InlineBitmap(_) => SourceKind::InlineBitmap,
            ImageSource::LocalFile(_) => SourceKind::LocalFile,
            ImageSource::NetworkUrl(_) => SourceKind::NetworkUrl,
            ImageSource::OpaqueBlob(_) => SourceKind::OpaqueBlob,
            ImageSource::Empty => SourceKind::Empty,
        }
    }

    pub fn is_network_url(&self) -> bool {
        matches!(self, ImageSource::NetworkUrl(_))
    }

    /// Short human-readable label for logs (never dumps blob bytes).
    pub fn describe(&self) -> String {
        match self {
            ImageSource::InlineBitmap(b) => format!("bitmap {}x{}", b.width(), b.height()),
            ImageSource::LocalFile(p) => format!("file {}", p.display()),
            ImageSource::NetworkUrl(u) => format!("url {}", u),
            ImageSource::OpaqueBlob(b) => format!("blob {} bytes", b.len()),
            ImageSource::Empty => "empty".to_string(),
        }
    }
}
