use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use image::{Luma, RgbImage};

use crate::errors::Result;
use crate::mask::MaskBuffer;
use crate::session::MaskModel;

/// Deterministic stand-in for the segmentation engine: everything within
/// `border` pixels of the image edge is background, the rest foreground.
/// Counts invocations so tests can assert that one engine instance serves a
/// whole batch.
#[derive(Debug, Clone, Default)]
pub struct MockMaskModel {
    border: u32,
    calls: Arc<AtomicUsize>,
}

impl MockMaskModel {
    pub fn new(border: u32) -> Self {
        Self {
            border,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MaskModel for MockMaskModel {
    fn infer_mask(&self, image: &RgbImage) -> Result<MaskBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        let border = self.border;
        Ok(MaskBuffer::from_fn(width, height, |x, y| {
            let inside = x >= border
                && y >= border
                && x < width.saturating_sub(border)
                && y < height.saturating_sub(border);
            Luma([if inside { 1.0 } else { 0.0 }])
        }))
    }
}
