//! Sequence mask kernels for batched, variable-length tensors.
//!
//! Inputs are laid out as `[max_sequence_length, batch, features...]` (or
//! `[batch, max_sequence_length, features...]` when the time axis is `1`).
//! Given one valid length per batch entry, the forward pass replaces every
//! time-step past that length with a constant and the backward pass zeroes
//! the matching gradient entries.
//!
//! Two backends share one predicate (see [`predicate`]):
//!
//! * [`host`] runs on CPU storage, generic over the element type, and
//!   processes rows in parallel with rayon. It registers a custom op so that
//!   candle's autodiff calls the matching backward kernel.
//! * [`device`] expresses the same predicate as a broadcast comparison and a
//!   `where_cond` selection, so it runs on whichever device holds the tensors.
//!
//! Both backends return [`candle_core::Result`] and never panic on malformed
//! input.

pub mod device;
pub mod host;
pub mod layout;
pub mod predicate;

use candle_core::{bail, DType, Device, Result, Tensor};

pub use layout::MaskLayout;
pub use predicate::{effective_len, is_masked};

/// Numeric settings consumed by both kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskParams {
    /// When `false` every step is valid and the lengths input is ignored.
    pub use_sequence_length: bool,
    /// Fill constant written at masked positions in the forward pass.
    pub value: f64,
    /// Position of the time dimension, `0` or `1`.
    pub axis: usize,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            use_sequence_length: false,
            value: 0.0,
            axis: 0,
        }
    }
}

impl MaskParams {
    /// Lengths the kernels should honour, or `None` for identity behaviour.
    pub fn active_lengths<'a>(&self, lengths: Option<&'a Tensor>) -> Option<&'a Tensor> {
        if self.use_sequence_length {
            lengths
        } else {
            None
        }
    }
}

/// Coerces a lengths vector to `i64` on `device`.
///
/// Any numeric dtype is accepted; fractional lengths truncate toward zero.
/// The vector must be rank 1 with exactly `batch` entries.
pub fn prepare_lengths(lengths: &Tensor, batch: usize, device: &Device) -> Result<Tensor> {
    match lengths.dims() {
        [len] if *len == batch => {}
        dims => bail!(
            "sequence_length must have shape [{batch}], got {:?}",
            dims
        ),
    }
    lengths
        .to_dtype(DType::I64)?
        .to_device(device)?
        .contiguous()
}
