//! Coordination sphere selection (§4.8): turns a `Structure` and a chosen
//! center atom into the `CoordAtom` list that `Analyzer` matches against the
//! reference library, either at a fixed radius or by auto-searching for one
//! that yields a target coordination number.

use crate::error::CshmError;
use crate::linalg::Vec3;
use crate::types::{CoordAtom, Structure};

/// Atoms closer than this to the center are treated as overlapping with it
/// rather than coordinating — guards against a center atom appearing twice
/// in its own structure (duplicate entries, symmetry-expanded cells).
const OVERLAP_GUARD: f64 = 0.1;

/// Fallback radius padding when there is no natural gap past the target CN
/// (every remaining atom lies within reach) — pushes the cutoff just past
/// the last wanted shell without also capturing its immediate neighbor.
const GAP_FALLBACK_PAD: f64 = 0.4;

/// Describes the radius gap straddled by an auto-selected cutoff.
#[derive(Debug, Clone, Copy)]
pub struct GapInfo {
    pub last_included_distance: f64,
    pub first_excluded_distance: Option<f64>,
    pub gap_size: Option<f64>,
}

fn distances_from(structure: &Structure, center_index: usize) -> Result<Vec<CoordAtom>, CshmError> {
    let center = structure
        .atoms
        .get(center_index)
        .ok_or_else(|| CshmError::InputValidation(format!("center index {center_index} out of range")))?
        .pos;

    let mut candidates: Vec<CoordAtom> = structure
        .atoms
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != center_index)
        .map(|(i, atom)| CoordAtom::new(i, atom.element.clone(), atom.pos - center))
        .filter(|c| c.distance > OVERLAP_GUARD)
        .collect();

    candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
    Ok(candidates)
}

/// Selects all atoms within `(OVERLAP_GUARD, radius]` of the center, sorted
/// by ascending distance.
pub fn select_by_radius(structure: &Structure, center_index: usize, radius: f64) -> Result<Vec<CoordAtom>, CshmError> {
    let all = distances_from(structure, center_index)?;
    let within: Vec<CoordAtom> = all.into_iter().filter(|c| c.distance <= radius).collect();
    if within.is_empty() {
        return Err(CshmError::CoordinationEmpty(format!(
            "no atoms within {radius:.3} of center {center_index}"
        )));
    }
    Ok(within)
}

/// Searches for a radius that yields exactly `target_cn` coordinating
/// atoms: the cutoff sits at the midpoint of the gap between the `target_cn`
/// closest atoms and the next one out, or `GAP_FALLBACK_PAD` past the last
/// included atom if there is no atom beyond it. Returns the selected atoms,
/// the radius used, and the gap straddled (for diagnostics / §4.8's gap
/// reporting).
pub fn select_by_target_cn(
    structure: &Structure,
    center_index: usize,
    target_cn: usize,
) -> Result<(Vec<CoordAtom>, f64, GapInfo), CshmError> {
    if target_cn == 0 {
        return Err(CshmError::InputValidation("target coordination number must be >= 1".to_string()));
    }
    let all = distances_from(structure, center_index)?;
    if all.len() < target_cn {
        return Err(CshmError::CoordinationEmpty(format!(
            "only {} candidate atoms found, need {target_cn}",
            all.len()
        )));
    }

    let last_included_distance = all[target_cn - 1].distance;
    let first_excluded_distance = all.get(target_cn).map(|c| c.distance);
    let (radius, gap_size) = match first_excluded_distance {
        Some(next) => ((last_included_distance + next) / 2.0, Some(next - last_included_distance)),
        None => (last_included_distance + GAP_FALLBACK_PAD, None),
    };

    let gap = GapInfo { last_included_distance, first_excluded_distance, gap_size };
    let selected = all.into_iter().take(target_cn).collect();
    Ok((selected, radius, gap))
}

/// Builds the point cloud `ShapeEval` compares against a reference, RMS
/// normalizing (never recentering — the center atom's own position defines
/// the origin) per §4.4's `mean_i |p_i|^2` denominator.
///
/// For CN = 3, per §4's documented exception, the cloud is the 3 ligand
/// vectors plus a literal zero vector standing in for the center atom's own
/// position, mirroring the reference library's 4-point CN = 3 entries.
pub fn to_actual_points(atoms: &[CoordAtom]) -> Vec<Vec3> {
    let mut points: Vec<Vec3> = atoms.iter().map(|a| a.vec).collect();
    if atoms.len() == 3 {
        points.push(Vec3::ZERO);
    }
    let n = points.len() as f64;
    let mean_sq: f64 = points.iter().map(|p| p.norm_sq()).sum::<f64>() / n;
    let rms = mean_sq.sqrt();
    if rms < 1e-12 {
        return points;
    }
    points.into_iter().map(|p| p * (1.0 / rms)).collect()
}
