//! Operator construction and the bound kernel instance.

use std::sync::OnceLock;

use candle_core::{DType, Device, Tensor};
use masking::MaskParams;

use crate::config::{LengthPolicy, SequenceMaskConfig};
use crate::dispatch::{kernel_table, Backend, KernelFns};
use crate::dtypes::MaskDType;
use crate::errors::{MaskError, Result};
use crate::infer::infer_shape;

/// A sequence mask bound to one device and one data dtype.
///
/// Instances are cheap to construct, allocate no tensor memory, and can be
/// shared across threads; each call produces a fresh output tensor.
#[derive(Debug)]
pub struct SequenceMask {
    config: SequenceMaskConfig,
    params: MaskParams,
    backend: Backend,
    dtype: MaskDType,
    device: Device,
    kernels: KernelFns,
    first_call: OnceLock<()>,
}

/// Validates `config`, resolves the backend for `device` and selects the
/// kernels compiled for `dtype`.
pub fn create_operator(
    config: &SequenceMaskConfig,
    device: &Device,
    dtype: DType,
) -> Result<SequenceMask> {
    config.validate()?;
    let dtype = MaskDType::try_from(dtype)?;
    let backend = Backend::resolve(config.backend, device)?;
    log::debug!(
        "sequence_mask bind backend={} dtype={} device={:?} use_sequence_length={} axis={}",
        backend,
        dtype,
        device.location(),
        config.use_sequence_length,
        config.axis
    );

    Ok(SequenceMask {
        config: config.clone(),
        params: config.params(),
        backend,
        dtype,
        device: device.clone(),
        kernels: kernel_table(backend, dtype),
        first_call: OnceLock::new(),
    })
}

impl SequenceMask {
    pub fn config(&self) -> &SequenceMaskConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn dtype(&self) -> DType {
        self.dtype.dtype()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Masks `data`. `sequence_length` must be present exactly when the
    /// config enables it. The result participates in candle autodiff.
    pub fn forward(&self, data: &Tensor, sequence_length: Option<&Tensor>) -> Result<Tensor> {
        self.check_inputs("data", data, sequence_length)?;

        if self.first_call.set(()).is_ok() {
            log::info!(
                "sequence_mask first forward backend={} dtype={} shape={:?} value={} length_policy={:?}",
                self.backend,
                self.dtype,
                data.dims(),
                self.params.value,
                self.config.length_policy
            );
        }

        Ok((self.kernels.forward)(data, sequence_length, &self.params)?)
    }

    /// Returns the gradient for `data` and `None` for `sequence_length`,
    /// which is an integer control input.
    pub fn backward(
        &self,
        output_grad: &Tensor,
        sequence_length: Option<&Tensor>,
    ) -> Result<(Tensor, Option<Tensor>)> {
        self.check_inputs("output_grad", output_grad, sequence_length)?;
        let data_grad = (self.kernels.backward)(output_grad, sequence_length, &self.params)?;
        Ok((data_grad, None))
    }

    fn check_inputs(
        &self,
        name: &str,
        input: &Tensor,
        sequence_length: Option<&Tensor>,
    ) -> Result<()> {
        if input.dtype() != self.dtype.dtype() {
            return Err(MaskError::UnsupportedDType {
                requested: format!(
                    "{:?} for {name}, operator is bound to {}",
                    input.dtype(),
                    self.dtype
                ),
            });
        }
        if !input.device().same_device(&self.device) {
            return Err(MaskError::backend(format!(
                "{name} lives on {:?} but the operator is bound to {:?}",
                input.device().location(),
                self.device.location()
            )));
        }

        let mut shapes = vec![input.dims()];
        if let Some(lengths) = sequence_length {
            shapes.push(lengths.dims());
        }
        infer_shape(&self.config, &shapes)?;

        if let (LengthPolicy::Reject, Some(lengths)) = (self.config.length_policy, sequence_length)
        {
            let (time_dim, _) = self.config.time_and_batch_dims();
            check_length_range(lengths, input.dims()[time_dim])?;
        }
        Ok(())
    }
}

fn check_length_range(lengths: &Tensor, steps: usize) -> Result<()> {
    let values = lengths.to_dtype(DType::I64)?.to_vec1::<i64>()?;
    for (batch, &length) in values.iter().enumerate() {
        if length < 0 || length > steps as i64 {
            return Err(MaskError::OutOfRangeLength {
                batch,
                length,
                steps,
            });
        }
    }
    Ok(())
}
