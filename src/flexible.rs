//! Anisotropic `(sx, sy, sz)` scale refinement layered on top of a converged
//! rigid [`crate::optimizer`] result (§4.6). The rigid rotation is held
//! fixed; only the reference cloud's axes are independently rescaled in
//! that fixed frame, and the assignment is re-solved at each candidate
//! scale.

use crate::assignment;
use crate::linalg::Vec3;
use crate::rng::DeterministicRng;
use crate::types::{FlexibleResult, Mode, ShapeResult};

const SCALE_MIN: f64 = 0.4;
const SCALE_MAX: f64 = 2.5;

fn clamp_scale(s: f64) -> f64 {
    s.clamp(SCALE_MIN, SCALE_MAX)
}

fn scale_point(q: Vec3, scale: Vec3) -> Vec3 {
    Vec3::new(q.x * scale.x, q.y * scale.y, q.z * scale.z)
}

fn measure_at_scale(rotated_actual: &[Vec3], reference: &[Vec3], scale: Vec3) -> f64 {
    let n = rotated_actual.len();
    let scaled: Vec<Vec3> = reference.iter().map(|&q| scale_point(q, scale)).collect();
    let cost: Vec<Vec<f64>> = rotated_actual
        .iter()
        .map(|&p| scaled.iter().map(|&q| (p - q).norm_sq()).collect())
        .collect();
    let pairs = assignment::solve(&cost);
    if pairs.len() != n {
        return f64::INFINITY;
    }
    let sum_sq: f64 = pairs.iter().map(|&(i, j)| (rotated_actual[i] - scaled[j]).norm_sq()).sum();
    100.0 * sum_sq / n as f64
}

struct Profile {
    restarts: usize,
    steps_per_restart: usize,
}

fn profile_for(mode: Mode) -> Profile {
    match mode {
        Mode::Default => Profile { restarts: 3, steps_per_restart: 80 },
        Mode::Intensive => Profile { restarts: 6, steps_per_restart: 200 },
    }
}

/// Refines `rigid` by searching anisotropic scale. If `rigid` is not a
/// valid (finite) result, the flexible result degenerates to it unchanged,
/// per §4.6.
pub fn refine(rigid: &ShapeResult, actual: &[Vec3], reference: &[Vec3], mode: Mode, rng: &mut DeterministicRng) -> FlexibleResult {
    if !rigid.is_valid() {
        return FlexibleResult {
            rigid_measure: rigid.measure,
            flexible_measure: rigid.measure,
            delta: 0.0,
            scale: Vec3::new(1.0, 1.0, 1.0),
            distortion_index: 0.0,
            description: "rigid result invalid; flexible result mirrors it".to_string(),
        };
    }

    let rotated_actual: Vec<Vec3> = actual.iter().map(|&p| rigid.rotation.apply(p)).collect();
    let profile = profile_for(mode);

    let mut best_scale = Vec3::new(1.0, 1.0, 1.0);
    let mut best_measure = measure_at_scale(&rotated_actual, reference, best_scale);

    for restart in 0..profile.restarts {
        let mut scale = if restart == 0 {
            Vec3::new(1.0, 1.0, 1.0)
        } else {
            Vec3::new(
                rng.uniform_range(SCALE_MIN, SCALE_MAX),
                rng.uniform_range(SCALE_MIN, SCALE_MAX),
                rng.uniform_range(SCALE_MIN, SCALE_MAX),
            )
        };
        let mut current_measure = measure_at_scale(&rotated_actual, reference, scale);
        let mut temp = 1.0f64;
        let min_temp = 1e-4;
        let cooling = (min_temp / temp).powf(1.0 / profile.steps_per_restart as f64);

        for _ in 0..profile.steps_per_restart {
            let k = 0.3 * (1.0 + 0.5 * rng.uniform());
            let span = temp * k * (SCALE_MAX - SCALE_MIN);
            let proposal = Vec3::new(
                clamp_scale(scale.x + rng.uniform_range(-span, span)),
                clamp_scale(scale.y + rng.uniform_range(-span, span)),
                clamp_scale(scale.z + rng.uniform_range(-span, span)),
            );
            let proposal_measure = measure_at_scale(&rotated_actual, reference, proposal);
            let delta = proposal_measure - current_measure;
            if delta < 0.0 || rng.uniform() < (-delta / temp.max(1e-12)).exp() {
                scale = proposal;
                current_measure = proposal_measure;
            }
            if current_measure < best_measure {
                best_measure = current_measure;
                best_scale = scale;
            }
            temp *= cooling;
        }
    }

    let delta = (rigid.measure - best_measure).max(0.0);
    let mean = (best_scale.x + best_scale.y + best_scale.z) / 3.0;
    let variance = [best_scale.x, best_scale.y, best_scale.z]
        .iter()
        .map(|&s| (s - mean).powi(2))
        .sum::<f64>()
        / 3.0;
    let distortion_index = if mean.abs() > 1e-12 { variance.sqrt() / mean } else { 0.0 };

    let axes = [("x", best_scale.x), ("y", best_scale.y), ("z", best_scale.z)];
    let longest = axes.iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).unwrap();
    let shortest = axes.iter().min_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).unwrap();
    let description = if distortion_index < 1e-3 {
        "isotropic, no axis stands out".to_string()
    } else {
        format!(
            "{} axis longest (s={:.3}), {} axis shortest (s={:.3})",
            longest.0, longest.1, shortest.0, shortest.1
        )
    };

    FlexibleResult {
        rigid_measure: rigid.measure,
        flexible_measure: best_measure,
        delta,
        scale: best_scale,
        distortion_index,
        description,
    }
}
