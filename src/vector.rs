//! Vector math primitives: L2 normalization, cosine distance, and the random
//! hyperplane draws used by [`crate::index::lsh`].
//!
//! All similarity reasoning downstream normalizes to unit L2 length first, so
//! cosine similarity degenerates to a plain dot product. The dot product is
//! hand-unrolled 8-wide the same way `abkve`'s hot search loop was, since this
//! function runs once per stored vector on every exact search and once per
//! hyperplane on every LSH insert.

use crate::error::{Result, VdbError};
use rand::Rng;
use rand_distr::StandardNormal;

/// Compute the L2 norm of a slice.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return `v / ‖v‖₂` as a new owned vector.
///
/// Fails with [`VdbError::DegenerateVector`] for a zero (or numerically
/// indistinguishable from zero) vector — there is no sensible unit direction
/// to report.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(v);
    if norm <= f32::EPSILON {
        return Err(VdbError::DegenerateVector);
    }
    let inv = 1.0 / norm;
    Ok(v.iter().map(|x| x * inv).collect())
}

/// Dot product of two equal-length slices.
///
/// Hand-unrolled 8 lanes at a time so the compiler can map each iteration to
/// one AVX2 `VFMADD231PS`, with 8 independent accumulators to avoid a serial
/// dependency chain through a single running sum. The remainder (length not
/// divisible by 8) falls back to safe, bounds-checked indexing since it runs
/// at most once per call.
#[inline(always)]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let chunks = len / 8;

    let mut acc0 = 0.0f32;
    let mut acc1 = 0.0f32;
    let mut acc2 = 0.0f32;
    let mut acc3 = 0.0f32;
    let mut acc4 = 0.0f32;
    let mut acc5 = 0.0f32;
    let mut acc6 = 0.0f32;
    let mut acc7 = 0.0f32;

    // SAFETY: `i * 8 + 7 < chunks * 8 <= len == a.len() == b.len()` (checked
    // by the debug_assert above in non-release builds; callers in this crate
    // only ever pass equal-length slices).
    unsafe {
        for i in 0..chunks {
            let base = i * 8;
            acc0 += a.get_unchecked(base) * b.get_unchecked(base);
            acc1 += a.get_unchecked(base + 1) * b.get_unchecked(base + 1);
            acc2 += a.get_unchecked(base + 2) * b.get_unchecked(base + 2);
            acc3 += a.get_unchecked(base + 3) * b.get_unchecked(base + 3);
            acc4 += a.get_unchecked(base + 4) * b.get_unchecked(base + 4);
            acc5 += a.get_unchecked(base + 5) * b.get_unchecked(base + 5);
            acc6 += a.get_unchecked(base + 6) * b.get_unchecked(base + 6);
            acc7 += a.get_unchecked(base + 7) * b.get_unchecked(base + 7);
        }
    }

    let mut result = acc0 + acc1 + acc2 + acc3 + acc4 + acc5 + acc6 + acc7;

    for i in (chunks * 8)..len {
        result += a[i] * b[i];
    }

    result
}

/// Cosine distance: `1 - dot(normalize(a), normalize(b))`, range `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    let na = normalize(a)?;
    let nb = normalize(b)?;
    Ok(1.0 - dot(&na, &nb))
}

/// Cosine distance between two vectors already known to be unit-normalized.
/// Skips the normalization pass entirely — used on the LSH/exact-index hot
/// path where stored vectors are normalized once at insert time.
#[inline]
pub fn cosine_distance_unit(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot(a, b)
}

/// Draw a `d`-length vector of independent standard-normal samples.
///
/// Not normalized: the sign of a dot product with this hyperplane is
/// invariant to positive rescaling, so LSH never pays for normalizing it.
pub fn random_hyperplane(d: usize, rng: &mut impl Rng) -> Vec<f32> {
    (0..d).map(|_| rng.sample(StandardNormal)).collect()
}

/// Sign bit used to pack one plane of an LSH signature. `sign(0) := 0`: an
/// exactly-zero dot product is folded into the same bucket as negative
/// dot products rather than minted a third bucket.
#[inline]
pub fn sign_bit(x: f32) -> u32 {
    if x > 0.0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_vector_is_a_no_op() {
        let v = normalize(&[1.0, 0.0, 0.0]).unwrap();
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_degenerate() {
        let err = normalize(&[0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, VdbError::DegenerateVector));
    }

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        let d = cosine_distance(&[3.0, 4.0], &[3.0, 4.0]).unwrap();
        assert!(d.abs() < 1e-5);
    }

    #[test]
    fn cosine_distance_of_orthogonal_vectors_is_one() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_distance_of_opposite_vectors_is_two() {
        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-5);
    }

    #[test]
    fn dot_product_matches_naive_for_non_multiple_of_eight_length() {
        let a: Vec<f32> = (0..13).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..13).map(|i| (i * 2) as f32).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - expected).abs() < 1e-3);
    }

    #[test]
    fn sign_bit_folds_zero_into_non_positive_bucket() {
        assert_eq!(sign_bit(0.0), 0);
        assert_eq!(sign_bit(-0.001), 0);
        assert_eq!(sign_bit(0.001), 1);
    }

    #[test]
    fn random_hyperplane_has_requested_length() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let h = random_hyperplane(32, &mut rng);
        assert_eq!(h.len(), 32);
    }
}
