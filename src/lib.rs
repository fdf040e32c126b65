//! Variable-length sequence masking for batched candle tensors.
//!
//! Re-exports the kernels ([`masking`]) and the operator contract
//! ([`operator`]) and adds device detection for callers that do not manage
//! devices themselves.

pub use masking;
pub use operator;
pub use operator::{
    create_operator, infer_shape, infer_type, Backend, BackendSelection, LengthPolicy, MaskError,
    SequenceMask, SequenceMaskConfig,
};

use candle_core::Device;

/// Picks the device sequence masks should run on.
///
/// `CANDLE_FORCE_CPU` pins the CPU. Otherwise Metal (with the `metal`
/// feature) and then CUDA are tried before falling back to the CPU.
pub fn setup_device() -> candle_core::Result<Device> {
    if std::env::var("CANDLE_FORCE_CPU").is_ok() {
        log::info!("CANDLE_FORCE_CPU set, using CPU backend");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                log::info!("Metal device selected: {:?}", device.location());
                return Ok(device);
            }
            Err(err) => log::info!("Metal unavailable ({err}), falling back"),
        }
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {:?}", device.location());
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("Using CPU backend");
            Ok(Device::Cpu)
        }
    }
}
