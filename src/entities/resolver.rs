//! SourceResolver: configured values → `ImageSource` descriptors.
//!
//! Pure transform, no I/O. A value that cannot be interpreted degrades to
//! `ImageSource::Empty` so one bad entry never aborts a whole animation.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use log::{trace, warn};
use reqwest::Url;

use super::source::{ImageSource, ImageValue};

/// Resolves raw image values. Relative paths are joined onto `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    base_dir: Option<PathBuf>,
}

impl SourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Scalar → one source, sequence → one source per element (in order).
    pub fn resolve(&self, value: &ImageValue) -> Vec<ImageSource> {
        match value {
            ImageValue::List(items) => items.iter().map(|item| self.resolve_one(item)).collect(),
            other => vec![self.resolve_one(other)],
        }
    }

    /// Resolve a single element. Nested lists are not frames and resolve to `Empty`.
    pub fn resolve_one(&self, value: &ImageValue) -> ImageSource {
        let source = match value {
            ImageValue::File(handle) => ImageSource::LocalFile(self.absolutize(handle.path())),
            ImageValue::Bitmap(bitmap) => ImageSource::InlineBitmap(bitmap.clone()),
            ImageValue::Blob(bytes) => ImageSource::OpaqueBlob(bytes.clone()),
            ImageValue::Text(text) => self.infer_from_text(text),
            ImageValue::List(_) => {
                warn!("Nested image list is not a frame, using placeholder");
                ImageSource::Empty
            }
            ImageValue::Unknown(raw) => {
                warn!("Unrecognized image value {}, using placeholder", raw);
                ImageSource::Empty
            }
        };
        trace!("Resolved image value -> {}", source.describe());
        source
    }

    /// Generic URL/blob inference for string values.
    fn infer_from_text(&self, text: &str) -> ImageSource {
        let text = text.trim();
        if text.is_empty() {
            return ImageSource::Empty;
        }

        if let Some(rest) = strip_prefix_ignore_case(text, "data:") {
            return match decode_data_url(rest) {
                Some(bytes) => ImageSource::OpaqueBlob(bytes),
                None => {
                    warn!("Malformed data URL, using placeholder");
                    ImageSource::Empty
                }
            };
        }

        if is_network_url(text) {
            return ImageSource::NetworkUrl(text.to_string());
        }

        if strip_prefix_ignore_case(text, "file:").is_some() {
            return match Url::parse(text).ok().and_then(|u| u.to_file_path().ok()) {
                Some(path) => ImageSource::LocalFile(path),
                None => {
                    warn!("Unusable file URL {}, using placeholder", text);
                    ImageSource::Empty
                }
            };
        }

        if has_foreign_scheme(text) {
            warn!("Unsupported URL scheme in {}, using placeholder", text);
            return ImageSource::Empty;
        }

        ImageSource::LocalFile(self.absolutize(Path::new(text)))
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// True for `http://` and `https://` strings (scheme is case-insensitive).
pub fn is_network_url(text: &str) -> bool {
    strip_prefix_ignore_case(text, "http://").is_some()
        || strip_prefix_ignore_case(text, "https://").is_some()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// `scheme://...` with a scheme we don't handle. Windows drive letters
/// (`C:\..`) never carry `//` so they fall through to paths.
fn has_foreign_scheme(text: &str) -> bool {
    match text.find("://") {
        Some(pos) if pos > 1 => text[..pos]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        _ => false,
    }
}

/// Payload of `data:[<mime>];base64,<data>`. Only base64 payloads are accepted.
fn decode_data_url(rest: &str) -> Option<Bytes> {
    let (meta, payload) = rest.split_once(',')?;
    if !meta.to_ascii_lowercase().ends_with(";base64") {
        return None;
    }
    general_purpose::STANDARD
        .decode(payload.trim())
        .ok()
        .map(Bytes::from)
}
