//! Queue payload: a decoded bitmap tagged with its position in the source list.

use super::bitmap::Bitmap;

/// Owned by the queue slot between production and consumption, then by the
/// display surface.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bitmap: Bitmap,
    pub index: usize,
}

impl Frame {
    pub fn new(bitmap: Bitmap, index: usize) -> Self {
        Self { bitmap, index }
    }
}
