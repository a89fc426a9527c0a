//! Multi-stage global search over `SO(3)` for the rotation minimizing
//! [`crate::shape_eval::evaluate`]: Kabsch seed → key orientations → grid
//! search → simulated annealing → local refinement, exactly the stage
//! structure of §4.5. Numeric constants are profile-dependent
//! (`Mode::Default` vs `Mode::Intensive`); the stage structure itself is
//! fixed.

use crate::linalg::Mat3;
use crate::linalg::Vec3;
use crate::rng::DeterministicRng;
use crate::shape_eval;
use crate::types::{CancelToken, Mode, ProgressEvent, ScaleMode, ShapeResult, Stage};
use std::time::Instant;

/// Numeric constants for one optimization profile. Declared, not derived —
/// §4.5 calls these out explicitly as fixed thresholds rather than computed
/// quantities.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerParams {
    pub grid_steps: usize,
    pub grid_stride: usize,
    pub num_restarts: usize,
    pub steps_per_run: usize,
    pub step_size_factor: f64,
    pub step_size_randomness: f64,
    pub initial_temp: f64,
    pub min_temp: f64,
    pub refinement_initial_temp: f64,
    pub temp_decay: f64,
    pub no_improvement_limit: usize,
    pub after_key_orientations: f64,
    pub after_grid_search: f64,
    pub after_annealing: f64,
    pub during_annealing_run: f64,
    pub during_refinement: f64,
}

impl OptimizerParams {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Default => OptimizerParams {
                grid_steps: 18,
                grid_stride: 3,
                num_restarts: 4,
                steps_per_run: 150,
                step_size_factor: 0.5,
                step_size_randomness: 0.5,
                initial_temp: 1.0,
                min_temp: 1e-4,
                refinement_initial_temp: 1e-3,
                temp_decay: 0.98,
                no_improvement_limit: 40,
                after_key_orientations: 0.05,
                after_grid_search: 0.02,
                after_annealing: 0.01,
                during_annealing_run: 0.005,
                during_refinement: 0.001,
            },
            Mode::Intensive => OptimizerParams {
                grid_steps: 30,
                grid_stride: 3,
                num_restarts: 10,
                steps_per_run: 400,
                step_size_factor: 0.3,
                step_size_randomness: 0.7,
                initial_temp: 1.0,
                min_temp: 1e-5,
                refinement_initial_temp: 5e-4,
                temp_decay: 0.99,
                no_improvement_limit: 100,
                after_key_orientations: 0.02,
                after_grid_search: 0.01,
                after_annealing: 0.005,
                during_annealing_run: 0.002,
                during_refinement: 0.0005,
            },
        }
    }
}

/// 18 fixed Euler triples covering identity, single-axis 90/180/270°
/// rotations, axis pairs, and π/4, π/3 combinations — the "obvious
/// symmetry-breaking rotations" of §4.5 Stage 1.
fn key_orientations() -> [(f64, f64, f64); 18] {
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_4, PI};
    let p2 = FRAC_PI_2;
    let p32 = 3.0 * FRAC_PI_2;
    [
        (0.0, 0.0, 0.0),
        (p2, 0.0, 0.0),
        (PI, 0.0, 0.0),
        (p32, 0.0, 0.0),
        (0.0, p2, 0.0),
        (0.0, PI, 0.0),
        (0.0, p32, 0.0),
        (0.0, 0.0, p2),
        (0.0, 0.0, PI),
        (0.0, 0.0, p32),
        (p2, p2, 0.0),
        (p2, 0.0, p2),
        (0.0, p2, p2),
        (PI, p2, 0.0),
        (p2, PI, 0.0),
        (p2, p2, p2),
        (FRAC_PI_4, FRAC_PI_4, FRAC_PI_4),
        (FRAC_PI_3, FRAC_PI_3, FRAC_PI_3),
    ]
}

fn suspend_requested(cancel: &CancelToken, deadline: Option<Instant>) -> bool {
    cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
}

/// Runs the full multi-stage search and returns the best [`ShapeResult`]
/// found. `progress` is invoked after each stage and periodically within
/// stages 2 and 3; percentages are approximate and non-decreasing except at
/// `Complete`. On cancellation or deadline expiry the current best is
/// returned immediately (or a failed result if nothing was evaluated yet).
#[allow(clippy::too_many_arguments)]
pub fn run(
    actual: &[Vec3],
    reference: &[Vec3],
    params: &OptimizerParams,
    scale_mode: ScaleMode,
    rng: &mut DeterministicRng,
    cancel: &CancelToken,
    deadline: Option<Instant>,
    mut progress: impl FnMut(ProgressEvent),
) -> ShapeResult {
    let eval = |r: &Mat3| shape_eval::evaluate(r, actual, reference, scale_mode);

    if actual.len() != reference.len() || actual.is_empty() {
        progress(ProgressEvent {
            stage: Stage::Complete,
            percent: 100,
            best_so_far: f64::INFINITY,
            extra: Some("size mismatch".to_string()),
        });
        return ShapeResult::failed();
    }

    // --- Stage 0: Kabsch seed -------------------------------------------------
    let identity_cost: Vec<Vec<f64>> = actual
        .iter()
        .map(|&p| reference.iter().map(|&q| (p - q).norm_sq()).collect())
        .collect();
    let seed_pairs = crate::assignment::solve(&identity_cost);
    let mut seed_perm = vec![0usize; actual.len()];
    for &(i, j) in &seed_pairs {
        seed_perm[i] = j;
    }
    let ordered_actual: Vec<Vec3> = (0..actual.len()).map(|i| actual[i]).collect();
    let ordered_reference: Vec<Vec3> = (0..actual.len()).map(|i| reference[seed_perm[i]]).collect();
    let r0 = crate::kabsch::kabsch_rotation(&ordered_actual, &ordered_reference);
    let mut best = eval(&r0);

    progress(ProgressEvent {
        stage: Stage::Kabsch,
        percent: 5,
        best_so_far: best.measure,
        extra: None,
    });

    if suspend_requested(cancel, deadline) {
        progress(ProgressEvent { stage: Stage::Complete, percent: 100, best_so_far: best.measure, extra: None });
        return best;
    }

    // --- Stage 1: key orientations --------------------------------------------
    if best.measure >= params.after_key_orientations {
        for (a, b, c) in key_orientations() {
            let r = Mat3::from_euler(a, b, c);
            let candidate = eval(&r);
            if candidate.measure < best.measure {
                best = candidate;
            }
        }
    }
    progress(ProgressEvent {
        stage: Stage::KeyOrientations,
        percent: 15,
        best_so_far: best.measure,
        extra: None,
    });

    if suspend_requested(cancel, deadline) || best.measure < params.after_key_orientations {
        progress(ProgressEvent { stage: Stage::Complete, percent: 100, best_so_far: best.measure, extra: None });
        return best;
    }

    // --- Stage 2: grid search ---------------------------------------------------
    if best.measure >= params.after_grid_search {
        let step = std::f64::consts::TAU / params.grid_steps as f64;
        let mut evals = 0usize;
        let indices: Vec<usize> = (0..params.grid_steps).step_by(params.grid_stride).collect();

        'grid: for &ia in &indices {
            for &ib in &indices {
                for &ic in &indices {
                    let r = Mat3::from_euler(ia as f64 * step, ib as f64 * step, ic as f64 * step);
                    let candidate = eval(&r);
                    if candidate.measure < best.measure {
                        best = candidate;
                    }
                    evals += 1;
                    if evals % 100 == 0 {
                        progress(ProgressEvent {
                            stage: Stage::GridSearch,
                            percent: 15 + ((35 * evals.min(indices.len().pow(3))) / indices.len().max(1).pow(3).max(1)) as u8,
                            best_so_far: best.measure,
                            extra: None,
                        });
                        if suspend_requested(cancel, deadline) {
                            break 'grid;
                        }
                    }
                }
            }
        }
    }
    progress(ProgressEvent { stage: Stage::GridSearch, percent: 50, best_so_far: best.measure, extra: None });

    if suspend_requested(cancel, deadline) || best.measure < params.after_grid_search {
        progress(ProgressEvent { stage: Stage::Complete, percent: 100, best_so_far: best.measure, extra: None });
        return best;
    }

    // --- Stage 3: simulated annealing ------------------------------------------
    if best.measure >= params.after_annealing {
        'restarts: for restart in 0..params.num_restarts {
            let mut current_rot = if restart == 0 {
                best.rotation
            } else if restart < params.num_restarts / 2 {
                let perturb = Mat3::from_axis_angle(rng.random_axis(), rng.uniform_range(-0.3, 0.3));
                perturb.matmul(&best.rotation)
            } else {
                rng.random_rotation()
            };
            let mut current = eval(&current_rot);
            let mut temp = params.initial_temp;
            let cooling = (params.min_temp / params.initial_temp).powf(1.0 / params.steps_per_run as f64);

            for step in 0..params.steps_per_run {
                let k = params.step_size_factor * (1.0 + params.step_size_randomness * rng.uniform());
                let angle = rng.uniform_range(-temp * k, temp * k);
                let axis = rng.random_axis();
                let proposal_rot = Mat3::from_axis_angle(axis, angle).matmul(&current_rot);
                let candidate = eval(&proposal_rot);

                let delta = candidate.measure - current.measure;
                let accept = delta < 0.0 || rng.uniform() < (-delta / temp.max(1e-12)).exp();
                if accept {
                    current_rot = proposal_rot;
                    current = candidate;
                }
                if current.measure < best.measure {
                    best = current.clone();
                }

                temp *= cooling;

                if step % 100 == 0 {
                    progress(ProgressEvent {
                        stage: Stage::Annealing,
                        percent: 50 + (40 * (restart * params.steps_per_run + step)
                            / (params.num_restarts * params.steps_per_run).max(1)) as u8,
                        best_so_far: best.measure,
                        extra: Some(format!("restart {restart}")),
                    });
                    if suspend_requested(cancel, deadline) {
                        break 'restarts;
                    }
                }

                if best.measure < params.during_annealing_run {
                    break;
                }
            }

            if best.measure < params.after_annealing {
                break;
            }
        }
    }
    progress(ProgressEvent { stage: Stage::Annealing, percent: 90, best_so_far: best.measure, extra: None });

    if suspend_requested(cancel, deadline) || best.measure < params.after_annealing {
        progress(ProgressEvent { stage: Stage::Complete, percent: 100, best_so_far: best.measure, extra: None });
        return best;
    }

    // --- Stage 4: local (greedy-only) refinement --------------------------------
    {
        let mut current_rot = best.rotation;
        let mut current = best.clone();
        let mut temp = params.refinement_initial_temp;
        let mut no_improvement = 0usize;
        let max_steps = params.steps_per_run * 4;

        for step in 0..max_steps {
            let angle = rng.uniform_range(-temp, temp);
            let axis = rng.random_axis();
            let proposal_rot = Mat3::from_axis_angle(axis, angle).matmul(&current_rot);
            let candidate = eval(&proposal_rot);

            if candidate.measure < current.measure {
                current_rot = proposal_rot;
                current = candidate.clone();
                no_improvement = 0;
                if candidate.measure < best.measure {
                    best = candidate;
                }
            } else {
                no_improvement += 1;
            }

            temp *= params.temp_decay;

            if step % 100 == 0 {
                progress(ProgressEvent {
                    stage: Stage::Refinement,
                    percent: 90 + (9 * step / max_steps.max(1)) as u8,
                    best_so_far: best.measure,
                    extra: None,
                });
                if suspend_requested(cancel, deadline) {
                    break;
                }
            }

            if no_improvement >= params.no_improvement_limit && best.measure < params.during_refinement {
                break;
            }
        }
    }

    progress(ProgressEvent { stage: Stage::Complete, percent: 100, best_so_far: best.measure, extra: None });
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octahedron() -> Vec<Vec3> {
        let mut pts = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        for p in &mut pts {
            *p = *p * (1.0 / p.norm());
        }
        pts
    }

    #[test]
    fn self_match_converges_near_zero() {
        let reference = octahedron();
        let params = OptimizerParams::for_mode(Mode::Default);
        let mut rng = DeterministicRng::new(1);
        let cancel = CancelToken::new();
        let result = run(&reference, &reference, &params, ScaleMode::Optimal, &mut rng, &cancel, None, |_| {});
        assert!(result.measure < 1e-3, "measure = {}", result.measure);
    }

    #[test]
    fn recovers_arbitrary_rotation() {
        let reference = octahedron();
        let r0 = Mat3::from_axis_angle(Vec3::new(0.3, 0.6, 0.74).normalized().unwrap(), 1.234);
        let actual: Vec<Vec3> = reference.iter().map(|&p| r0.apply(p)).collect();

        let params = OptimizerParams::for_mode(Mode::Intensive);
        let mut rng = DeterministicRng::new(2);
        let cancel = CancelToken::new();
        let result = run(&actual, &reference, &params, ScaleMode::Optimal, &mut rng, &cancel, None, |_| {});
        assert!(result.measure < 1e-2, "measure = {}", result.measure);
    }

    #[test]
    fn determinism_given_same_seed() {
        let reference = octahedron();
        let r0 = Mat3::from_axis_angle(Vec3::new(0.1, 0.2, 0.97).normalized().unwrap(), 0.5);
        let actual: Vec<Vec3> = reference.iter().map(|&p| r0.apply(p)).collect();
        let params = OptimizerParams::for_mode(Mode::Default);
        let cancel = CancelToken::new();

        let mut rng1 = DeterministicRng::new(77);
        let result1 = run(&actual, &reference, &params, ScaleMode::Optimal, &mut rng1, &cancel, None, |_| {});
        let mut rng2 = DeterministicRng::new(77);
        let result2 = run(&actual, &reference, &params, ScaleMode::Optimal, &mut rng2, &cancel, None, |_| {});

        assert_eq!(result1.measure, result2.measure);
    }

    #[test]
    fn cancellation_returns_promptly_with_current_best() {
        let reference = octahedron();
        let params = OptimizerParams::for_mode(Mode::Intensive);
        let mut rng = DeterministicRng::new(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run(&reference, &reference, &params, ScaleMode::Optimal, &mut rng, &cancel, None, |_| {});
        // Stage 0 (Kabsch seed) always runs before the first suspension
        // point, so a pre-cancelled token still yields a finite result.
        assert!(result.measure.is_finite());
    }
}
