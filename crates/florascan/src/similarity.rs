//! Cosine similarity between image descriptors.

use crate::types::{FloraError, FloraResult};

/// Compute cosine similarity between two descriptors.
///
/// Pure and side-effect free. Returns 0.0 when either vector has zero
/// magnitude; vectors of different lengths are a caller bug and are
/// rejected rather than silently scored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> FloraResult<f32> {
    if a.len() != b.len() {
        return Err(FloraError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / denom) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&b, &a).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        let err = cosine_similarity(&a, &b).unwrap_err();
        assert!(matches!(err, FloraError::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn bounded_for_arbitrary_vectors() {
        let a = vec![3.5, -2.0, 0.25, 7.0];
        let b = vec![-1.0, 4.0, 2.5, 0.5];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((-1.0..=1.0).contains(&sim));
    }
}
