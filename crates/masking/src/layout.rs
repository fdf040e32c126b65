//! Index arithmetic for `[T, B, F...]` (time-major) and `[B, T, F...]`
//! (batch-major) tensors.
//!
//! Trailing feature dimensions are flattened into a single contiguous block
//! of `features` elements. A "row" is one such block, i.e. the data for a
//! single `(step, batch)` coordinate.

use candle_core::{bail, Result};

/// Shape summary consumed by the mask kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskLayout {
    steps: usize,
    batch: usize,
    features: usize,
    axis: usize,
}

impl MaskLayout {
    /// Builds a layout from tensor dimensions.
    ///
    /// `axis` names the time dimension and must be `0` or `1`; the batch
    /// dimension is the other one. The tensor must have rank greater than 2.
    pub fn from_dims(dims: &[usize], axis: usize) -> Result<Self> {
        if dims.len() <= 2 {
            bail!(
                "sequence mask expects rank > 2 input, got shape {:?}",
                dims
            );
        }
        let (steps, batch) = match axis {
            0 => (dims[0], dims[1]),
            1 => (dims[1], dims[0]),
            other => bail!("sequence mask time axis must be 0 or 1, got {other}"),
        };
        let features = dims[2..].iter().product();
        Ok(Self {
            steps,
            batch,
            features,
            axis,
        })
    }

    /// Maximum sequence length `T`.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Batch size `B`.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of elements in one `(step, batch)` row.
    pub fn features(&self) -> usize {
        self.features
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn rows(&self) -> usize {
        self.steps * self.batch
    }

    pub fn numel(&self) -> usize {
        self.rows() * self.features
    }

    /// Maps a row index in memory order to its `(step, batch)` coordinate.
    #[inline]
    pub fn coords(&self, row: usize) -> (usize, usize) {
        if self.axis == 0 {
            (row / self.batch, row % self.batch)
        } else {
            (row % self.steps, row / self.steps)
        }
    }

    /// Offset of the first element of the `(step, batch)` row.
    #[cfg(test)]
    pub fn row_offset(&self, step: usize, batch: usize) -> usize {
        let row = if self.axis == 0 {
            step * self.batch + batch
        } else {
            batch * self.steps + step
        };
        row * self.features
    }

    /// Dimensions of the `[T, B]` (or `[B, T]`) keep-mask, padded with unit
    /// dimensions so it broadcasts against a tensor of rank `rank`.
    pub fn mask_dims(&self, rank: usize) -> Vec<usize> {
        let mut dims = if self.axis == 0 {
            vec![self.steps, self.batch]
        } else {
            vec![self.batch, self.steps]
        };
        dims.resize(rank.max(2), 1);
        dims
    }
}
