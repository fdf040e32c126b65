//! Static `(backend, dtype)` dispatch.
//!
//! The table maps each backend and element type to a pair of plain function
//! pointers. Host entries are monomorphized per dtype; the device
//! formulation is dtype-agnostic and shares one entry.

use std::fmt;

use candle_core::{Device, DeviceLocation, Tensor};
use half::{bf16, f16};
use masking::{device, host, MaskParams};

use crate::config::BackendSelection;
use crate::dtypes::MaskDType;
use crate::errors::{MaskError, Result};

/// Kernel family an operator instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Rayon-parallel loop over CPU storage.
    Host,
    /// Broadcast-compare plus `where_cond` on the tensors' device.
    Device,
}

impl Backend {
    /// Resolves a configured selection against the device the operator is
    /// bound to.
    pub fn resolve(selection: BackendSelection, device: &Device) -> Result<Self> {
        match (selection, device.location()) {
            (BackendSelection::Auto, DeviceLocation::Cpu) => Ok(Backend::Host),
            (BackendSelection::Auto, _) => Ok(Backend::Device),
            (BackendSelection::HostOnly, DeviceLocation::Cpu) => Ok(Backend::Host),
            (BackendSelection::HostOnly, location) => Err(MaskError::backend(format!(
                "host kernels cannot run on {location:?}"
            ))),
            (BackendSelection::DeviceOnly, _) => Ok(Backend::Device),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Host => f.write_str("host"),
            Backend::Device => f.write_str("device"),
        }
    }
}

/// Signature shared by every forward kernel.
pub type ForwardFn = fn(&Tensor, Option<&Tensor>, &MaskParams) -> candle_core::Result<Tensor>;
/// Signature shared by every backward kernel.
pub type BackwardFn = fn(&Tensor, Option<&Tensor>, &MaskParams) -> candle_core::Result<Tensor>;

/// Forward/backward pair selected for one operator instance.
#[derive(Clone, Copy)]
pub struct KernelFns {
    pub forward: ForwardFn,
    pub backward: BackwardFn,
}

impl fmt::Debug for KernelFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelFns").finish_non_exhaustive()
    }
}

pub fn kernel_table(backend: Backend, dtype: MaskDType) -> KernelFns {
    match (backend, dtype) {
        (Backend::Host, MaskDType::F16) => KernelFns {
            forward: host::forward::<f16>,
            backward: host::backward::<f16>,
        },
        (Backend::Host, MaskDType::BF16) => KernelFns {
            forward: host::forward::<bf16>,
            backward: host::backward::<bf16>,
        },
        (Backend::Host, MaskDType::F32) => KernelFns {
            forward: host::forward::<f32>,
            backward: host::backward::<f32>,
        },
        (Backend::Host, MaskDType::F64) => KernelFns {
            forward: host::forward::<f64>,
            backward: host::backward::<f64>,
        },
        (Backend::Device, _) => KernelFns {
            forward: device::forward,
            backward: device::backward,
        },
    }
}
