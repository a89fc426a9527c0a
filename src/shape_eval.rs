//! Given a candidate rotation, computes the best Continuous Shape Measure
//! over all vertex assignments (and, in the optimal-scale variant, the
//! best isotropic scale) — the innermost function the Optimizer calls
//! repeatedly.

use crate::assignment;
use crate::linalg::{Mat3, Vec3};
use crate::types::{ScaleMode, ShapeResult};

/// Evaluates one candidate rotation against a reference cloud.
///
/// `actual` and `reference` must have equal length `N`; on mismatch this
/// returns [`ShapeResult::failed`]. Both are assumed centroid-free and
/// RMS-normalized by the caller (`actual` by [`crate::coordination`],
/// `reference` by [`crate::reference_library`]).
pub fn evaluate(rotation: &Mat3, actual: &[Vec3], reference: &[Vec3], scale_mode: ScaleMode) -> ShapeResult {
    let n = actual.len();
    if n == 0 || n != reference.len() {
        return ShapeResult::failed();
    }

    let rotated: Vec<Vec3> = actual.iter().map(|&p| rotation.apply(p)).collect();

    let cost: Vec<Vec<f64>> = rotated
        .iter()
        .map(|&p| reference.iter().map(|&q| (p - q).norm_sq()).collect())
        .collect();

    let pairs = assignment::solve(&cost);
    if pairs.len() != n {
        return ShapeResult::failed();
    }

    // assignment[i] = reference vertex matched to actual point i.
    let mut perm = vec![0usize; n];
    for &(i, j) in &pairs {
        perm[i] = j;
    }

    let scale = match scale_mode {
        ScaleMode::Fixed => 1.0,
        ScaleMode::Optimal => {
            let numer: f64 = (0..n).map(|i| rotated[i].dot(reference[perm[i]])).sum();
            let denom: f64 = (0..n).map(|i| reference[perm[i]].norm_sq()).sum();
            if denom > 1e-300 {
                numer / denom
            } else {
                1.0
            }
        }
    };

    let sum_sq: f64 = (0..n)
        .map(|i| (rotated[i] - reference[perm[i]] * scale).norm_sq())
        .sum();
    let measure = 100.0 * sum_sq / n as f64;

    if !measure.is_finite() {
        return ShapeResult::failed();
    }

    // aligned[j] = rotated actual point matched to reference vertex j.
    let mut aligned = vec![Vec3::ZERO; n];
    for i in 0..n {
        aligned[perm[i]] = rotated[i];
    }

    ShapeResult { measure, rotation: *rotation, assignment: perm, scale, aligned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identical_clouds_measure_near_zero() {
        let cloud = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ];
        let result = evaluate(&Mat3::IDENTITY, &cloud, &cloud, ScaleMode::Optimal);
        assert!(result.measure < 1e-8, "measure = {}", result.measure);
    }

    #[test]
    fn permuted_clouds_still_measure_near_zero() {
        let reference = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ];
        let mut actual = reference.clone();
        actual.swap(0, 2);
        let result = evaluate(&Mat3::IDENTITY, &actual, &reference, ScaleMode::Optimal);
        assert!(result.measure < 1e-8, "measure = {}", result.measure);
        assert_eq!(result.assignment[0], 2);
        assert_eq!(result.assignment[2], 0);
    }

    #[test]
    fn fixed_scale_mode_penalizes_size_mismatch() {
        let reference = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ];
        let actual: Vec<Vec3> = reference.iter().map(|&v| v * 2.0).collect();
        let fixed = evaluate(&Mat3::IDENTITY, &actual, &reference, ScaleMode::Fixed);
        let optimal = evaluate(&Mat3::IDENTITY, &actual, &reference, ScaleMode::Optimal);
        assert!(fixed.measure > 1.0);
        assert_abs_diff_eq!(optimal.measure, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(optimal.scale, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn mismatched_lengths_fail_cleanly() {
        let a = vec![Vec3::new(1.0, 0.0, 0.0)];
        let b = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let result = evaluate(&Mat3::IDENTITY, &a, &b, ScaleMode::Optimal);
        assert!(!result.is_valid());
    }

    #[test]
    fn measure_is_never_negative() {
        let reference = vec![Vec3::new(1.0, 0.2, -0.3), Vec3::new(-1.0, 0.1, 0.4)];
        let actual = vec![Vec3::new(0.9, -0.1, 0.2), Vec3::new(-0.8, 0.3, -0.1)];
        let result = evaluate(&Mat3::IDENTITY, &actual, &reference, ScaleMode::Optimal);
        assert!(result.measure >= 0.0);
    }
}
