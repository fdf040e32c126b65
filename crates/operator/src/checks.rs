//! Lightweight validation helpers used by shape and type inference.
//!
//! Each check returns [`MaskError::Shape`] or [`MaskError::UnsupportedDType`]
//! with a message naming the offending input, so callers can propagate with
//! `?` instead of panicking.

use candle_core::DType;

use crate::errors::{MaskError, Result};

/// Ensures the operator received exactly `expected` inputs.
pub fn expect_arity(actual: usize, expected: usize, use_sequence_length: bool) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(MaskError::shape(format!(
            "expected {expected} input(s) with use_sequence_length={use_sequence_length}, got {actual}"
        )))
    }
}

/// Ensures `dims` has strictly more than `min` dimensions.
pub fn expect_rank_above(name: &str, dims: &[usize], min: usize) -> Result<()> {
    if dims.len() > min {
        Ok(())
    } else {
        Err(MaskError::shape(format!(
            "{name} must have rank > {min}, got shape {:?}",
            dims
        )))
    }
}

/// Ensures `dims` describes a vector of exactly `len` entries.
pub fn expect_vector_len(name: &str, dims: &[usize], len: usize) -> Result<()> {
    match dims {
        [actual] if *actual == len => Ok(()),
        _ => Err(MaskError::shape(format!(
            "{name} must have shape [{len}], got {:?}",
            dims
        ))),
    }
}

/// Checks the dtype is one of the allowed values.
pub fn expect_dtype_in(name: &str, dtype: DType, allowed: &[DType]) -> Result<()> {
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(MaskError::UnsupportedDType {
            requested: format!("{dtype:?} for {name}, expected one of {:?}", allowed),
        })
    }
}
