//! Drives one (structure, center atom) analysis (§4.10): runs the Optimizer
//! against every reference registered for the observed coordination number,
//! ranks the results, and derives quality indices against the winner.
//! Errors follow §7's propagation policy — only `Internal` ever returns as
//! an `Err`; everything else becomes `AnalysisResult.error`.

use crate::cache::{self, Cache};
use crate::coordination;
use crate::error::CshmError;
use crate::flexible;
use crate::optimizer::{self, OptimizerParams};
use crate::quality;
use crate::reference_library::ReferenceLibrary;
use crate::rng::DeterministicRng;
use crate::types::{AnalysisResult, CancelToken, CoordAtom, GeometryResult, ProgressEvent, RunConfig};
use std::time::Instant;

/// Owns a result cache across a run. `ReferenceLibrary` is a process-wide
/// singleton (§4.7), so it is not duplicated here; a fresh `Analyzer` is
/// cheap and holds only its own cache.
#[derive(Default)]
pub struct Analyzer {
    cache: Cache,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Runs the full analysis for one center atom's coordination sphere.
    /// `progress` is called once per progress event, prefixed with the
    /// reference code currently being evaluated.
    pub fn analyze(
        &self,
        structure_name: impl Into<String>,
        center_index: usize,
        atoms: &[CoordAtom],
        config: &RunConfig,
        cancel: &CancelToken,
        mut progress: impl FnMut(&str, ProgressEvent),
    ) -> Result<AnalysisResult, CshmError> {
        let structure_name = structure_name.into();
        let cn = atoms.len();

        if atoms.is_empty() {
            return Ok(AnalysisResult::with_error(structure_name, center_index, cn, "empty coordination sphere"));
        }

        let key = cache::fingerprint(config.mode, cn, config.flexible, atoms);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(cache_key = %key, "cache hit");
            return Ok(cached);
        }

        let references = ReferenceLibrary::for_cn(cn);
        if references.is_empty() {
            tracing::warn!(cn, "no reference library entries");
            return Ok(AnalysisResult::with_error(
                structure_name,
                center_index,
                cn,
                CshmError::NoReference(cn).message(),
            ));
        }

        let actual_points = coordination::to_actual_points(atoms);
        let params = OptimizerParams::for_mode(config.mode);
        let deadline = config.timeout.map(|d| Instant::now() + d);

        let mut rankings: Vec<GeometryResult> = Vec::with_capacity(references.len());
        for (idx, reference) in references.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let mut rng = DeterministicRng::new(config.seed).child(idx as u64);
            let shape = optimizer::run(
                &actual_points,
                &reference.points,
                &params,
                config.scale_mode,
                &mut rng,
                cancel,
                deadline,
                |ev| progress(&reference.code, ev),
            );

            if !shape.measure.is_finite() {
                tracing::warn!(code = %reference.code, "numeric failure evaluating reference, skipping");
                continue;
            }

            let flexible_result = if config.flexible {
                Some(flexible::refine(&shape, &actual_points, &reference.points, config.mode, &mut rng))
            } else {
                None
            };

            rankings.push(GeometryResult {
                reference_code: reference.code.clone(),
                reference_name: reference.name.clone(),
                point_group: reference.point_group.clone(),
                shape,
                flexible: flexible_result,
            });
        }

        if cancel.is_cancelled() {
            return Ok(AnalysisResult::with_error(structure_name, center_index, cn, "cancelled"));
        }

        if rankings.is_empty() {
            return Ok(AnalysisResult::with_error(
                structure_name,
                center_index,
                cn,
                format!("all {} references failed numerically for CN {cn}", references.len()),
            ));
        }

        rankings.sort_by(|a, b| a.shape.measure.partial_cmp(&b.shape.measure).unwrap());

        let best_code = rankings[0].reference_code.clone();
        let best_reference = references.iter().find(|r| r.code == best_code).ok_or_else(|| {
            CshmError::Internal(format!("best reference code {best_code} vanished from library"))
        })?;

        let bond_stats = quality::bond_stats(atoms);
        let quality_indices = quality::compute(atoms, &bond_stats, &rankings[0].shape, best_reference);

        let result = AnalysisResult {
            structure_name,
            center_index,
            cn,
            rankings,
            best_index: Some(0),
            bond_stats: Some(bond_stats),
            quality: Some(quality_indices),
            error: None,
        };

        self.cache.put(key, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vec3;
    use crate::types::{Mode, ScaleMode};

    fn octahedral_atoms() -> Vec<CoordAtom> {
        let dirs = [
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(-2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, -2.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, -2.0),
        ];
        dirs.iter().enumerate().map(|(i, &v)| CoordAtom::new(i, "Cl".to_string(), v)).collect()
    }

    fn fast_config() -> RunConfig {
        RunConfig { mode: Mode::Default, flexible: false, seed: 1, timeout: None, scale_mode: ScaleMode::Optimal }
    }

    #[test]
    fn perfect_octahedron_ranks_oc6_first_near_zero() {
        let analyzer = Analyzer::new();
        let atoms = octahedral_atoms();
        let cancel = CancelToken::new();
        let result = analyzer.analyze("fe_complex", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_none());
        let best = result.best().unwrap();
        assert_eq!(best.reference_code, "OC-6");
        assert!(best.shape.measure < 1e-2, "measure = {}", best.shape.measure);
        assert!(
            result.rankings[1].shape.measure > 10.0,
            "second best should be well above 10, got {}",
            result.rankings[1].shape.measure
        );
    }

    /// Worked example: four ligands at (1,1,1), (1,-1,-1), (-1,1,-1),
    /// (-1,-1,1). Best = T-4, measure < 0.01; SP-4 > 30.
    #[test]
    fn regular_tetrahedron_ranks_t4_first_and_sp4_far_above() {
        let analyzer = Analyzer::new();
        let atoms = vec![
            CoordAtom::new(0, "Cl".to_string(), Vec3::new(1.0, 1.0, 1.0)),
            CoordAtom::new(1, "Cl".to_string(), Vec3::new(1.0, -1.0, -1.0)),
            CoordAtom::new(2, "Cl".to_string(), Vec3::new(-1.0, 1.0, -1.0)),
            CoordAtom::new(3, "Cl".to_string(), Vec3::new(-1.0, -1.0, 1.0)),
        ];
        let cancel = CancelToken::new();
        let result = analyzer.analyze("tetrahedron", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_none());
        let best = result.best().unwrap();
        assert_eq!(best.reference_code, "T-4");
        assert!(best.shape.measure < 1e-2, "measure = {}", best.shape.measure);
        let sp4 = result.rankings.iter().find(|g| g.reference_code == "SP-4").expect("SP-4 should be ranked");
        assert!(sp4.shape.measure > 30.0, "measure = {}", sp4.shape.measure);
    }

    /// §8's worked-example tolerance ("±2% absolute error") as a relative
    /// bound floored at a small absolute value, so it stays meaningful for
    /// expected measures near zero.
    fn within_documented_tolerance(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < (0.02 * expected).max(0.02)
    }

    /// Worked example: four ligands at (1,0,0), (0,1,0), (-1,0,0), (0,-1,0).
    /// Best = SP-4 (~0); T-4 ~= 33.3.
    #[test]
    fn square_planar_ranks_sp4_first_and_t4_near_33() {
        let analyzer = Analyzer::new();
        let atoms = vec![
            CoordAtom::new(0, "Cl".to_string(), Vec3::new(1.0, 0.0, 0.0)),
            CoordAtom::new(1, "Cl".to_string(), Vec3::new(0.0, 1.0, 0.0)),
            CoordAtom::new(2, "Cl".to_string(), Vec3::new(-1.0, 0.0, 0.0)),
            CoordAtom::new(3, "Cl".to_string(), Vec3::new(0.0, -1.0, 0.0)),
        ];
        let cancel = CancelToken::new();
        let result = analyzer.analyze("square_planar", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_none());
        let best = result.best().unwrap();
        assert_eq!(best.reference_code, "SP-4");
        assert!(best.shape.measure < 1e-2, "measure = {}", best.shape.measure);
        let t4 = result.rankings.iter().find(|g| g.reference_code == "T-4").expect("T-4 should be ranked");
        assert!(within_documented_tolerance(t4.shape.measure, 33.3), "measure = {}", t4.shape.measure);
    }

    /// Worked example: ammonia, CN=3 trigonal pyramid. N at the center;
    /// H ligand vectors given relative to N. Best = vT-3, measure ~= 0.029;
    /// fac-vOC-3 ~= 2.17.
    #[test]
    fn ammonia_ranks_vt3_first_near_its_documented_measure() {
        let analyzer = Analyzer::new();
        let n = Vec3::new(-0.5265, -0.0022, -0.7633);
        let h = [
            Vec3::new(-0.0155, -0.8755, -0.7216),
            Vec3::new(0.1498, 0.7509, -0.7328),
            Vec3::new(-0.9915, 0.0389, -1.6620),
        ];
        let atoms: Vec<CoordAtom> =
            h.iter().enumerate().map(|(i, &p)| CoordAtom::new(i + 1, "H".to_string(), p - n)).collect();
        let cancel = CancelToken::new();
        let result = analyzer.analyze("ammonia", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_none());
        let best = result.best().unwrap();
        assert_eq!(best.reference_code, "vT-3");
        assert!(within_documented_tolerance(best.shape.measure, 0.029), "measure = {}", best.shape.measure);
        let fac = result.rankings.iter().find(|g| g.reference_code == "fac-vOC-3").expect("fac-vOC-3 should be ranked");
        assert!(within_documented_tolerance(fac.shape.measure, 2.17), "measure = {}", fac.shape.measure);
    }

    /// Worked example: cancelling an intensive CN=8 run mid-flight must
    /// return within the documented wall-clock bound, and must not leave a
    /// cache entry for that fingerprint behind.
    #[test]
    fn mid_run_cancellation_returns_quickly_and_is_not_cached() {
        use std::thread;
        use std::time::{Duration, Instant};

        let analyzer = Analyzer::new();
        let atoms: Vec<CoordAtom> = (0..8)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::PI / 4.0;
                CoordAtom::new(i, "Cl".to_string(), Vec3::new(angle.cos(), angle.sin(), (i as f64) * 0.07))
            })
            .collect();
        let cancel = CancelToken::new();
        let cancel_for_thread = cancel.clone();
        let _canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancel_for_thread.cancel();
        });

        let config = RunConfig { mode: Mode::Intensive, flexible: false, seed: 7, timeout: None, scale_mode: ScaleMode::Optimal };

        let t0 = Instant::now();
        let result = analyzer.analyze("cn8_cancel", 0, &atoms, &config, &cancel, |_, _| {}).unwrap();
        let elapsed = t0.elapsed();

        assert!(elapsed <= Duration::from_millis(200), "cancellation took too long: {elapsed:?}");
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(analyzer.cache_len(), 0);
    }

    #[test]
    fn empty_sphere_is_a_soft_error() {
        let analyzer = Analyzer::new();
        let cancel = CancelToken::new();
        let result = analyzer.analyze("empty", 0, &[], &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_some());
        assert!(result.rankings.is_empty());
    }

    #[test]
    fn unknown_cn_is_a_soft_no_reference_error() {
        let analyzer = Analyzer::new();
        let atoms: Vec<CoordAtom> = (0..97)
            .map(|i| CoordAtom::new(i, "X".to_string(), Vec3::new(i as f64 + 1.0, 0.0, 0.0)))
            .collect();
        let cancel = CancelToken::new();
        let result = analyzer.analyze("huge", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert!(result.error.is_some());
    }

    #[test]
    fn second_identical_call_is_served_from_cache() {
        let analyzer = Analyzer::new();
        let atoms = octahedral_atoms();
        let cancel = CancelToken::new();
        let config = fast_config();
        analyzer.analyze("a", 0, &atoms, &config, &cancel, |_, _| {}).unwrap();
        assert_eq!(analyzer.cache_len(), 1);
        let second = analyzer.analyze("a", 0, &atoms, &config, &cancel, |_, _| {}).unwrap();
        assert_eq!(analyzer.cache_len(), 1);
        assert_eq!(second.best().unwrap().reference_code, "OC-6");
    }

    #[test]
    fn cancelled_before_start_yields_soft_error_and_is_not_cached() {
        let analyzer = Analyzer::new();
        let atoms = octahedral_atoms();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = analyzer.analyze("a", 0, &atoms, &fast_config(), &cancel, |_, _| {}).unwrap();
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(analyzer.cache_len(), 0);
    }
}
