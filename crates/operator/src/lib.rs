//! Operator contract for the sequence mask.
//!
//! This crate sits between a graph builder and the kernels in [`masking`]:
//!
//! * [`infer_shape`] and [`infer_type`] validate wiring before any data
//!   flows. Inputs are `data` shaped `[T, B, features...]` (rank > 2) and,
//!   when `use_sequence_length` is set, a `sequence_length` vector of `B`
//!   entries.
//! * [`create_operator`] binds a [`SequenceMaskConfig`] to a device and a
//!   floating-point dtype, choosing kernels from a static
//!   `(Backend, MaskDType)` table. No global registry is involved; callers
//!   construct operators where they build their graph.
//! * [`SequenceMask::forward`] and [`SequenceMask::backward`] run the bound
//!   kernels. Masked positions receive the configured `value` going forward
//!   and a zero gradient going back.

pub mod checks;
pub mod config;
pub mod dispatch;
pub mod dtypes;
pub mod errors;
pub mod infer;
pub mod kernel;

pub use config::{
    BackendSelection, LengthPolicy, SequenceMaskConfig, BACKEND_ENV, LENGTH_POLICY_ENV,
};
pub use dispatch::{kernel_table, Backend, KernelFns};
pub use dtypes::{MaskDType, SUPPORTED_DTYPES};
pub use errors::{MaskError, Result};
pub use infer::{infer_shape, infer_type};
pub use kernel::{create_operator, SequenceMask};
