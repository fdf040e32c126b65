//! Device sequence mask kernel built from candle tensor primitives.
//!
//! The predicate `step < length` is evaluated for every `(step, batch)` pair
//! at once by comparing `arange(T)` against the lengths vector. The resulting
//! `u8` keep-mask is broadcast over the feature dimensions and fed to
//! `where_cond`, which candle executes as one elementwise kernel on CUDA,
//! Metal or CPU. Out-of-range lengths need no special casing: a length at or
//! below zero keeps nothing and a length at or past `T` keeps everything,
//! exactly like the clamped host predicate.

use candle_core::{Device, Result, Tensor};

use crate::layout::MaskLayout;
use crate::{prepare_lengths, MaskParams};

/// Builds the `u8` keep-mask for `layout`, shaped to broadcast against a
/// tensor of the given rank. Entries are `1` for valid steps.
pub fn keep_mask(
    lengths: &Tensor,
    layout: &MaskLayout,
    rank: usize,
    device: &Device,
) -> Result<Tensor> {
    let lengths = prepare_lengths(lengths, layout.batch(), device)?;
    let steps = Tensor::arange(0i64, layout.steps() as i64, device)?;
    let keep = if layout.axis() == 0 {
        steps
            .reshape((layout.steps(), 1))?
            .broadcast_lt(&lengths.reshape((1, layout.batch()))?)?
    } else {
        steps
            .reshape((1, layout.steps()))?
            .broadcast_lt(&lengths.reshape((layout.batch(), 1))?)?
    };
    keep.reshape(layout.mask_dims(rank))
}

/// Forward pass on the tensors' own device.
pub fn forward(data: &Tensor, lengths: Option<&Tensor>, params: &MaskParams) -> Result<Tensor> {
    apply(data, lengths, params, params.value)
}

/// Backward pass on the tensors' own device.
pub fn backward(
    output_grad: &Tensor,
    lengths: Option<&Tensor>,
    params: &MaskParams,
) -> Result<Tensor> {
    apply(output_grad, lengths, params, 0.0)
}

fn apply(input: &Tensor, lengths: Option<&Tensor>, params: &MaskParams, fill: f64) -> Result<Tensor> {
    let layout = MaskLayout::from_dims(input.dims(), params.axis)?;
    let Some(lengths) = params.active_lengths(lengths) else {
        return input.copy();
    };

    let device = input.device();
    let keep = keep_mask(lengths, &layout, input.rank(), device)?.broadcast_as(input.shape())?;
    // Cast the scalar on the host so the sign of zero survives.
    let fill = Tensor::new(fill, &Device::Cpu)?
        .to_dtype(input.dtype())?
        .to_device(device)?
        .broadcast_as(input.shape())?;
    keep.where_cond(input, &fill)
}
