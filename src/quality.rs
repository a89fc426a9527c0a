//! Derived bond and angle statistics (§4.9): `BondStats` from the raw
//! coordination sphere, and `QualityIndices` computed against the
//! best-matching reference once `Analyzer` has picked it.

use crate::linalg::Vec3;
use crate::types::{BondStats, CoordAtom, QualityIndices, ShapeResult};
use crate::types::ReferenceGeometry;

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn std_dev(xs: &[f64], m: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

fn angle_degrees(a: Vec3, b: Vec3) -> f64 {
    let denom = a.norm() * b.norm();
    if denom < 1e-12 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

fn pairwise_angles(vecs: &[Vec3]) -> Vec<f64> {
    let mut out = Vec::new();
    for i in 0..vecs.len() {
        for j in (i + 1)..vecs.len() {
            out.push(angle_degrees(vecs[i], vecs[j]));
        }
    }
    out
}

/// Bond distance and inter-ligand angle statistics straight from the
/// coordination sphere, independent of any reference match.
pub fn bond_stats(atoms: &[CoordAtom]) -> BondStats {
    let distances: Vec<f64> = atoms.iter().map(|a| a.distance).collect();
    let mean_distance = mean(&distances);
    let std_distance = std_dev(&distances, mean_distance);
    let min_distance = distances.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_distance = distances.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let vecs: Vec<Vec3> = atoms.iter().map(|a| a.vec).collect();
    let angles = pairwise_angles(&vecs);
    let mean_angle = mean(&angles);
    let std_angle = std_dev(&angles, mean_angle);
    let min_angle = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_angle = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    BondStats {
        mean_distance,
        std_distance,
        min_distance: if min_distance.is_finite() { min_distance } else { 0.0 },
        max_distance: if max_distance.is_finite() { max_distance } else { 0.0 },
        angle_count: angles.len(),
        mean_angle,
        std_angle,
        min_angle: if min_angle.is_finite() { min_angle } else { 0.0 },
        max_angle: if max_angle.is_finite() { max_angle } else { 0.0 },
    }
}

/// Quality indices computed against the best-ranked `GeometryResult`.
///
/// `angular_distortion` compares actual inter-ligand angles to the ideal
/// reference angles under the winning assignment, excluding the synthesized
/// center point of a CN = 3 match (real ligand atoms only on both sides);
/// it is `None` only if fewer than two real ligands remain to compare, which
/// should not happen for any structure that reached ranking.
pub fn compute(atoms: &[CoordAtom], bonds: &BondStats, shape: &ShapeResult, reference: &ReferenceGeometry) -> QualityIndices {
    let ligand_count = atoms.len();
    let total_points = shape.aligned.len();
    let excluded_ref_idx = if total_points > ligand_count { shape.assignment.get(ligand_count).copied() } else { None };

    let ligand_indices: Vec<usize> = (0..total_points).filter(|&j| Some(j) != excluded_ref_idx).collect();

    let angular_distortion = if ligand_indices.len() >= 2 {
        let mut actual_angles = pairwise_angles(&ligand_indices.iter().map(|&j| shape.aligned[j]).collect::<Vec<_>>());
        let mut ideal_angles = pairwise_angles(&ligand_indices.iter().map(|&j| reference.points[j]).collect::<Vec<_>>());
        actual_angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
        ideal_angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
        if !actual_angles.is_empty() && actual_angles.len() == ideal_angles.len() {
            Some(mean(&actual_angles.iter().zip(&ideal_angles).map(|(a, b)| (a - b).abs()).collect::<Vec<_>>()))
        } else {
            None
        }
    } else {
        None
    };

    let bond_length_uniformity_pct = if bonds.mean_distance > 1e-12 {
        (100.0 * (1.0 - bonds.std_distance / bonds.mean_distance)).clamp(0.0, 100.0)
    } else {
        100.0
    };

    // The measure is already normalized by the mean squared actual bond
    // length (§4.4); undo that to get an approximate real-space RMSD.
    let rms_real = (bonds.mean_distance.powi(2) + bonds.std_distance.powi(2)).sqrt();
    let approx_rmsd = (shape.measure / 100.0).max(0.0).sqrt() * rms_real;

    let ang = angular_distortion.unwrap_or(0.0);
    let overall_score =
        (100.0 - 2.0 * shape.measure - 0.5 * ang - 0.3 * (100.0 - bond_length_uniformity_pct)).clamp(0.0, 100.0);

    QualityIndices { angular_distortion, bond_length_uniformity_pct, approx_rmsd, overall_score }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Mat3;
    use crate::types::CoordAtom;

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

    #[test]
    fn perfect_octahedron_has_uniform_bonds_and_right_angles() {
        let atoms = octahedral_atoms();
        let stats = bond_stats(&atoms);
        assert!((stats.mean_distance - 2.0).abs() < 1e-9);
        assert!(stats.std_distance < 1e-9);
        assert_eq!(stats.angle_count, 15);
    }

    #[test]
    fn bond_length_uniformity_is_100_for_equal_bonds() {
        let atoms = octahedral_atoms();
        let stats = bond_stats(&atoms);
        let reference = ReferenceGeometry {
            code: "OC-6".to_string(),
            name: "Octahedron".to_string(),
            point_group: "Oh".to_string(),
            points: vec![
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(0.0, 0.0, -1.0),
            ],
        };
        let shape = ShapeResult {
            measure: 0.0,
            rotation: Mat3::IDENTITY,
            assignment: vec![0, 1, 2, 3, 4, 5],
            scale: 2.0,
            aligned: reference.points.clone(),
        };
        let quality = compute(&atoms, &stats, &shape, &reference);
        assert_eq!(quality.bond_length_uniformity_pct, 100.0);
        assert_eq!(quality.overall_score, 100.0);
    }

    #[test]
    fn overall_score_weighs_in_angular_distortion_and_bond_uniformity() {
        // Distances are unequal (std_distance > 0) and the aligned cloud is
        // distorted away from the reference's right angles, so both the
        // angular-distortion and uniformity terms are nonzero.
        let dirs = [
            Vec3::new(1.8, 0.0, 0.0),
            Vec3::new(-2.2, 0.0, 0.0),
            Vec3::new(0.0, 1.9, 0.0),
            Vec3::new(0.0, -2.1, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, -2.3),
        ];
        let atoms: Vec<CoordAtom> = dirs.iter().enumerate().map(|(i, &v)| CoordAtom::new(i, "Cl".to_string(), v)).collect();
        let stats = bond_stats(&atoms);
        assert!(stats.std_distance > 1e-6);

        let reference = ReferenceGeometry {
            code: "OC-6".to_string(),
            name: "Octahedron".to_string(),
            point_group: "Oh".to_string(),
            points: vec![
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(0.0, 0.0, -1.0),
            ],
        };
        // Tilt one vertex off-axis so the aligned angles no longer match the
        // reference's right angles.
        let aligned = vec![
            Vec3::new(1.0, 0.2, 0.1).normalized().unwrap(),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        let shape = ShapeResult {
            measure: 5.0,
            rotation: Mat3::IDENTITY,
            assignment: vec![0, 1, 2, 3, 4, 5],
            scale: 2.0,
            aligned,
        };

        let quality = compute(&atoms, &stats, &shape, &reference);
        let ang = quality.angular_distortion.expect("angular distortion should be computable");
        assert!(ang > 0.0, "expected nonzero angular distortion, got {ang}");
        assert!(quality.bond_length_uniformity_pct < 100.0);

        let expected = (100.0 - 2.0 * shape.measure - 0.5 * ang - 0.3 * (100.0 - quality.bond_length_uniformity_pct)).clamp(0.0, 100.0);
        assert!((quality.overall_score - expected).abs() < 1e-9);
        assert!(quality.overall_score < 100.0 - 2.0 * shape.measure, "weighted penalties should pull the score below the naive 100 - 2S");
    }
}
