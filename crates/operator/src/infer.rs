//! Shape and type inference.
//!
//! Both functions are pure and run before any data flows, so a graph
//! builder can reject bad wiring up front. Inputs are ordered as in
//! [`SequenceMaskConfig::input_names`]: `data`, then `sequence_length` when
//! `use_sequence_length` is set.

use candle_core::{DType, Shape};

use crate::checks;
use crate::config::SequenceMaskConfig;
use crate::dtypes::SUPPORTED_DTYPES;
use crate::errors::Result;

/// Validates input shapes and returns the output shapes.
///
/// `data` must have rank > 2; `sequence_length` must be a vector whose length
/// equals the batch dimension. The single output mirrors `data`.
pub fn infer_shape(config: &SequenceMaskConfig, inputs: &[&[usize]]) -> Result<Vec<Shape>> {
    checks::expect_arity(inputs.len(), config.num_inputs(), config.use_sequence_length)?;

    let data = inputs[0];
    checks::expect_rank_above("data", data, 2)?;

    if config.use_sequence_length {
        let (_, batch_dim) = config.time_and_batch_dims();
        checks::expect_vector_len("sequence_length", inputs[1], data[batch_dim])?;
    }

    Ok(vec![Shape::from_dims(data)])
}

/// Validates input dtypes and returns the output dtypes.
///
/// The data dtype must be one of [`SUPPORTED_DTYPES`]. The lengths dtype is
/// not constrained; kernels coerce it to `i64`.
pub fn infer_type(config: &SequenceMaskConfig, inputs: &[DType]) -> Result<Vec<DType>> {
    checks::expect_arity(inputs.len(), config.num_inputs(), config.use_sequence_length)?;
    checks::expect_dtype_in("data", inputs[0], &SUPPORTED_DTYPES)?;
    Ok(vec![inputs[0]])
}
