//! Dense f32 tensors and frame-to-tensor conversion.

mod builder;

pub use builder::TensorBuilder;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Memory order of an image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, N, N]`, one plane per channel (detector input).
    Planar,
    /// `[1, N, N, 3]`, channels adjacent per pixel (classifier input).
    Interleaved,
}

impl TensorLayout {
    /// Shape of a square RGB tensor with edge `size`.
    pub const fn shape(self, size: usize) -> [usize; 4] {
        match self {
            Self::Planar => [1, 3, size, size],
            Self::Interleaved => [1, size, size, 3],
        }
    }
}

/// A flat f32 buffer with its shape.
///
/// The element count always equals the product of the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    layout: Option<TensorLayout>,
}

impl Tensor {
    /// Create a tensor, checking the element count against the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(Error::TensorShape {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape,
            layout: None,
        })
    }

    /// Zero-filled image tensor of the given layout.
    pub(crate) fn zeros(layout: TensorLayout, size: usize) -> Self {
        let shape = layout.shape(size).to_vec();
        Self {
            data: vec![0.0; shape.iter().product()],
            shape,
            layout: Some(layout),
        }
    }

    /// Dimensions, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat element buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Image layout, if this tensor was built from a frame.
    pub const fn layout(&self) -> Option<TensorLayout> {
        self.layout
    }

    /// Take the buffer out of the tensor.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_element_count() {
        assert!(Tensor::new(vec![1, 2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(vec![1, 2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(
            err,
            Error::TensorShape {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_layout_shapes() {
        assert_eq!(TensorLayout::Planar.shape(640), [1, 3, 640, 640]);
        assert_eq!(TensorLayout::Interleaved.shape(480), [1, 480, 480, 3]);
    }

    #[test]
    fn test_zeros_matches_shape() {
        let t = Tensor::zeros(TensorLayout::Interleaved, 4);
        assert_eq!(t.data().len(), 48);
        assert_eq!(t.layout(), Some(TensorLayout::Interleaved));
    }
}
