//! Target class selection
//!
//! Picks the scalar to explain out of a score vector: the maximum by
//! default, or an explicit caller override validated against the vector
//! length. No side effects.

use anyhow::Result;

use crate::error::ExplainError;

/// Select the class index to explain.
///
/// Default policy is the index of the maximum score, with ties broken by
/// first occurrence in index order. An explicit `override_index` must
/// satisfy `index < scores.len()` or the call fails with
/// `InvalidArgument`.
pub fn select_class(scores: &[f32], override_index: Option<usize>) -> Result<usize> {
    if scores.is_empty() {
        return Err(ExplainError::invalid("empty score vector"));
    }

    if let Some(index) = override_index {
        if index >= scores.len() {
            return Err(ExplainError::invalid(format!(
                "class override {} out of range (have {} classes)",
                index,
                scores.len()
            )));
        }
        return Ok(index);
    }

    // Strict > keeps the first occurrence on ties; Iterator::max_by would
    // keep the last.
    let mut best = 0;
    for (idx, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = idx;
        }
    }
    Ok(best)
}
