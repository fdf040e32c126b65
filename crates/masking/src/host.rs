//! Host (CPU) sequence mask kernel.
//!
//! The kernel walks the input row by row, where a row is the contiguous
//! feature block of one `(step, batch)` coordinate. Rows are independent, so
//! they are split across the rayon pool and each output row is written by
//! exactly one worker.

use std::marker::PhantomData;

use candle_core::{
    bail, CpuStorage, CustomOp1, CustomOp2, Layout, Result, Shape, Tensor, WithDType,
};
use rayon::prelude::*;

use crate::layout::MaskLayout;
use crate::predicate::{effective_len, is_masked};
use crate::{prepare_lengths, MaskParams};

/// Rows handed to a rayon task at minimum; small inputs stay on one thread.
const MIN_ROWS_PER_TASK: usize = 64;

/// Masks `src` row by row, writing `fill` wherever the predicate says so.
///
/// `src` must hold exactly `layout.numel()` elements in memory order and
/// `lengths`, when given, one entry per batch element.
pub fn mask_rows<T: WithDType>(
    src: &[T],
    layout: &MaskLayout,
    lengths: Option<&[i64]>,
    fill: T,
) -> Vec<T> {
    let mut out = vec![fill; layout.numel()];
    if out.is_empty() {
        return out;
    }

    let steps = layout.steps();
    out.par_chunks_mut(layout.features())
        .zip(src.par_chunks(layout.features()))
        .enumerate()
        .with_min_len(MIN_ROWS_PER_TASK)
        .for_each(|(row, (dst, src))| {
            let (step, batch) = layout.coords(row);
            let valid = effective_len(lengths.map(|lengths| lengths[batch]), steps);
            if !is_masked(step, valid) {
                dst.copy_from_slice(src);
            }
        });
    out
}

/// Candle custom op wrapping [`mask_rows`] for element type `T`.
///
/// Forward instances carry the configured fill value; the adjoint used for
/// gradients carries `0`. The op is linear with a 0/1 diagonal, so the
/// adjoint of either instance is the zero-fill instance.
struct HostSequenceMask<T> {
    axis: usize,
    fill: f64,
    _dtype: PhantomData<T>,
}

impl<T: WithDType> HostSequenceMask<T> {
    fn new(axis: usize, fill: f64) -> Self {
        Self {
            axis,
            fill,
            _dtype: PhantomData,
        }
    }

    fn adjoint(&self) -> Self {
        Self::new(self.axis, 0.0)
    }

    fn run(
        &self,
        storage: &CpuStorage,
        layout: &Layout,
        lengths: Option<&[i64]>,
    ) -> Result<(CpuStorage, Shape)> {
        let src = contiguous_slice::<T>(storage, layout)?;
        let mask_layout = MaskLayout::from_dims(layout.dims(), self.axis)?;
        if let Some(lengths) = lengths {
            if lengths.len() != mask_layout.batch() {
                bail!(
                    "sequence_length has {} entries but batch size is {}",
                    lengths.len(),
                    mask_layout.batch()
                );
            }
        }

        let out = mask_rows(src, &mask_layout, lengths, T::from_f64(self.fill));
        Ok((T::to_cpu_storage_owned(out), layout.shape().clone()))
    }
}

fn contiguous_slice<'a, T: WithDType>(storage: &'a CpuStorage, layout: &Layout) -> Result<&'a [T]> {
    let data = T::cpu_storage_as_slice(storage)?;
    match layout.contiguous_offsets() {
        Some((start, end)) => Ok(&data[start..end]),
        None => bail!("sequence mask requires a contiguous tensor"),
    }
}

impl<T: WithDType> CustomOp1 for HostSequenceMask<T> {
    fn name(&self) -> &'static str {
        "sequence-mask"
    }

    fn cpu_fwd(&self, storage: &CpuStorage, layout: &Layout) -> Result<(CpuStorage, Shape)> {
        self.run(storage, layout, None)
    }

    fn bwd(&self, _arg: &Tensor, _res: &Tensor, grad_res: &Tensor) -> Result<Option<Tensor>> {
        let grad = grad_res.contiguous()?.apply_op1_no_bwd(&self.adjoint())?;
        Ok(Some(grad))
    }
}

impl<T: WithDType> CustomOp2 for HostSequenceMask<T> {
    fn name(&self) -> &'static str {
        "sequence-mask"
    }

    fn cpu_fwd(
        &self,
        s1: &CpuStorage,
        l1: &Layout,
        s2: &CpuStorage,
        l2: &Layout,
    ) -> Result<(CpuStorage, Shape)> {
        let lengths = contiguous_slice::<i64>(s2, l2)?;
        self.run(s1, l1, Some(lengths))
    }

    // Lengths are an integer control input and never receive a gradient.
    fn bwd(
        &self,
        _arg1: &Tensor,
        arg2: &Tensor,
        _res: &Tensor,
        grad_res: &Tensor,
    ) -> Result<(Option<Tensor>, Option<Tensor>)> {
        let grad = grad_res
            .contiguous()?
            .apply_op2_no_bwd(arg2, &self.adjoint())?;
        Ok((Some(grad), None))
    }
}

/// Forward pass: copies valid rows and fills the rest with `params.value`.
pub fn forward<T: WithDType>(
    data: &Tensor,
    lengths: Option<&Tensor>,
    params: &MaskParams,
) -> Result<Tensor> {
    apply::<T>(data, lengths, params, params.value)
}

/// Backward pass: propagates the gradient of valid rows and zeroes the rest.
pub fn backward<T: WithDType>(
    output_grad: &Tensor,
    lengths: Option<&Tensor>,
    params: &MaskParams,
) -> Result<Tensor> {
    apply::<T>(output_grad, lengths, params, 0.0)
}

fn apply<T: WithDType>(
    input: &Tensor,
    lengths: Option<&Tensor>,
    params: &MaskParams,
    fill: f64,
) -> Result<Tensor> {
    if !input.device().is_cpu() {
        bail!(
            "host sequence mask kernel needs a cpu tensor, got {:?}",
            input.device().location()
        );
    }
    if input.dtype() != T::DTYPE {
        bail!(
            "host sequence mask kernel bound to {:?} received {:?}",
            T::DTYPE,
            input.dtype()
        );
    }

    let layout = MaskLayout::from_dims(input.dims(), params.axis)?;
    log::trace!(
        "sequence mask host kernel steps={} batch={} features={}",
        layout.steps(),
        layout.batch(),
        layout.features()
    );

    let input = input.contiguous()?;
    let op = HostSequenceMask::<T>::new(params.axis, fill);
    match params.active_lengths(lengths) {
        None => input.apply_op1(op),
        Some(lengths) => {
            let lengths = prepare_lengths(lengths, layout.batch(), input.device())?;
            input.apply_op2(&lengths, op)
        }
    }
}
