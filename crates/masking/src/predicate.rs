//! The masked/unmasked decision shared by every backend and both passes.
//!
//! A `(step, batch)` coordinate is masked when `step >= effective_len`, where
//! the effective length is the batch entry's valid length clamped into
//! `[0, steps]`. Lengths at or below zero therefore mask the whole sequence
//! and lengths at or beyond `steps` mask nothing.

/// Resolves the valid length for one batch entry.
///
/// `None` means sequence lengths are disabled and every step is valid.
pub fn effective_len(length: Option<i64>, steps: usize) -> usize {
    match length {
        None => steps,
        Some(len) => len.clamp(0, steps as i64) as usize,
    }
}

/// Returns `true` when `step` lies past the valid prefix.
#[inline]
pub fn is_masked(step: usize, effective_len: usize) -> bool {
    step >= effective_len
}
