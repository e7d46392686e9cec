//! Frame to model-input conversion with a pooled buffer.

use super::{Tensor, TensorLayout};
use crate::frame::{CHANNELS, PixelFrame, Region};
use tracing::trace;

/// Scale factor mapping 8-bit channel values into `[0, 1]`.
const NORMALIZE: f32 = 1.0 / 255.0;

/// Converts frames into square, normalized RGB tensors.
///
/// Each builder owns one buffer that is reused for every frame of the same
/// target shape; changing the size or layout replaces it. A builder belongs
/// to a single inference pipeline and is never shared.
#[derive(Debug)]
pub struct TensorBuilder {
    size: u32,
    layout: TensorLayout,
    pool: Option<Tensor>,
}

impl TensorBuilder {
    /// Builder for `size` x `size` tensors in the given layout.
    pub const fn new(size: u32, layout: TensorLayout) -> Self {
        Self {
            size,
            layout,
            pool: None,
        }
    }

    /// Target edge length.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Target layout.
    pub const fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Change the target edge length. The pooled buffer is dropped if it no
    /// longer fits.
    pub fn set_size(&mut self, size: u32) {
        if size != self.size {
            self.size = size;
            self.pool = None;
        }
    }

    /// Convert a whole frame.
    ///
    /// Returns `None` for a zero-sized frame; callers skip such frames.
    pub fn build(&mut self, frame: &PixelFrame) -> Option<&Tensor> {
        self.build_region(frame, Region::full(frame))
    }

    /// Convert a sub-rectangle of a frame, resampled to the target size.
    ///
    /// The region is clamped to the frame first. Returns `None` when nothing
    /// is left to sample.
    pub fn build_region(&mut self, frame: &PixelFrame, region: Region) -> Option<&Tensor> {
        let region = region.clamp_to(frame.width(), frame.height());
        if frame.is_empty() || region.is_empty() || self.size == 0 {
            return None;
        }

        let n = self.size as usize;
        let layout = self.layout;
        let expected = layout.shape(n);
        let reuse = self
            .pool
            .as_ref()
            .is_some_and(|t| t.shape() == expected.as_slice() && t.layout() == Some(layout));
        if !reuse {
            trace!("Allocating {:?} tensor buffer for {}x{}", layout, n, n);
            self.pool = Some(Tensor::zeros(layout, n));
        }
        let tensor = self.pool.as_mut()?;
        let out = tensor.data_mut();

        let direct = region == Region::full(frame)
            && frame.width() == self.size
            && frame.height() == self.size;
        if direct {
            fill_direct(out, frame, n, layout);
        } else {
            fill_sampled(out, frame, region, n, layout);
        }

        self.pool.as_ref()
    }
}

#[inline]
fn write_pixel(out: &mut [f32], px: &[u8], dst: usize, plane: usize, layout: TensorLayout) {
    match layout {
        TensorLayout::Planar => {
            out[dst] = f32::from(px[0]) * NORMALIZE;
            out[plane + dst] = f32::from(px[1]) * NORMALIZE;
            out[2 * plane + dst] = f32::from(px[2]) * NORMALIZE;
        }
        TensorLayout::Interleaved => {
            let base = dst * 3;
            out[base] = f32::from(px[0]) * NORMALIZE;
            out[base + 1] = f32::from(px[1]) * NORMALIZE;
            out[base + 2] = f32::from(px[2]) * NORMALIZE;
        }
    }
}

/// Frame already matches the target size: one linear pass.
fn fill_direct(out: &mut [f32], frame: &PixelFrame, n: usize, layout: TensorLayout) {
    let plane = n * n;
    for (i, px) in frame.data().chunks_exact(CHANNELS).enumerate().take(plane) {
        write_pixel(out, px, i, plane, layout);
    }
}

/// Nearest-neighbor resample: `src = floor(dst * src_dim / n)`.
fn fill_sampled(
    out: &mut [f32],
    frame: &PixelFrame,
    region: Region,
    n: usize,
    layout: TensorLayout,
) {
    let plane = n * n;
    let stride = frame.width() as usize * CHANNELS;
    let rw = region.width as usize;
    let rh = region.height as usize;
    let x0 = region.x as usize;
    let y0 = region.y as usize;

    for dy in 0..n {
        let sy = y0 + dy * rh / n;
        let row = sy * stride;
        for dx in 0..n {
            let sx = x0 + dx * rw / n;
            let src = row + sx * CHANNELS;
            let px = &frame.data()[src..src + CHANNELS];
            write_pixel(out, px, dy * n + dx, plane, layout);
        }
    }
}
