//! Closed-form coordinate clouds for the reference polyhedra CShM is scored
//! against (§4.7). Each entry is built once from plain geometric
//! construction, then centered and RMS-normalized by [`normalize`] before
//! being stored — the same normalization applies uniformly to every CN,
//! including the CN = 3 entries whose fourth point stands for the central
//! atom rather than a ligand (§4 of SPEC_FULL.md, Open Question b).

use crate::linalg::Vec3;
use crate::types::ReferenceGeometry;
use std::collections::HashMap;
use std::sync::OnceLock;

fn v(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Subtracts the centroid, then divides by the RMS distance from it so the
/// cloud has centroid at the origin and mean squared norm 1 (§4.7's
/// invariant for CN ≥ 4).
fn center_and_scale(points: Vec<Vec3>) -> Vec<Vec3> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vec3::ZERO, |acc, &p| acc + p) * (1.0 / n);
    let centered: Vec<Vec3> = points.iter().map(|&p| p - centroid).collect();
    scale_only(centered)
}

/// Divides by RMS distance from the origin; origin left fixed. For CN = 3's
/// augmented 4-point construction the 4th point marks where the physical
/// center atom sits relative to the 3 ligand directions — that offset is
/// the pyramidality signal, so it must not be recentered away. `coordination`
/// mirrors this on the actual side: ligand vectors plus a literal zero
/// vector for the center, RMS-scaled but never shifted.
fn scale_only(points: Vec<Vec3>) -> Vec<Vec3> {
    let n = points.len() as f64;
    let mean_sq: f64 = points.iter().map(|p| p.norm_sq()).sum::<f64>() / n;
    let rms = mean_sq.sqrt();
    if rms < 1e-12 {
        return points;
    }
    points.into_iter().map(|p| p * (1.0 / rms)).collect()
}

fn normalize(cn: usize, points: Vec<Vec3>) -> Vec<Vec3> {
    if cn == 3 {
        scale_only(points)
    } else {
        center_and_scale(points)
    }
}

/// `n` points evenly spaced around the unit circle in the `z = height`
/// plane, starting at angle `phase`.
fn polygon(n: usize, height: f64, phase: f64) -> Vec<Vec3> {
    (0..n)
        .map(|i| {
            let theta = phase + std::f64::consts::TAU * i as f64 / n as f64;
            v(theta.cos(), theta.sin(), height)
        })
        .collect()
}

const TET_A: f64 = 0.577_350_269_189_625_8; // 1/sqrt(3)

/// The four vertices of a regular tetrahedron centered at the origin.
fn tetrahedron_vertices() -> [Vec3; 4] {
    [
        v(TET_A, TET_A, TET_A),
        v(TET_A, -TET_A, -TET_A),
        v(-TET_A, TET_A, -TET_A),
        v(-TET_A, -TET_A, TET_A),
    ]
}

fn raw_points(code: &str) -> Vec<Vec3> {
    match code {
        "L-2" => vec![v(1.0, 0.0, 0.0), v(-1.0, 0.0, 0.0)],
        "A-2" => vec![v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)],

        // CN = 3: three ligand directions plus the central atom's own
        // position relative to the parent polyhedron they're cut from.
        // Angle between ligand vectors is what distinguishes the three.
        "TP-3" => polygon(3, 0.0, 0.0),
        "vT-3" => {
            let t = tetrahedron_vertices();
            vec![t[1], t[2], t[3], Vec3::ZERO]
        }
        "fac-vOC-3" => vec![v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(0.0, 0.0, 1.0), Vec3::ZERO],

        "SP-4" => vec![v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(-1.0, 0.0, 0.0), v(0.0, -1.0, 0.0)],
        "T-4" => tetrahedron_vertices().to_vec(),
        "SS-4" => {
            // Monovacant trigonal bipyramid: axial pair plus two of the
            // three equatorial vertices.
            let mut pts = vec![v(0.0, 0.0, 1.0), v(0.0, 0.0, -1.0)];
            pts.extend(polygon(3, 0.0, 0.0).into_iter().take(2));
            pts
        }

        "PP-5" => polygon(5, 0.0, 0.0),
        "TBPY-5" => {
            let mut pts = vec![v(0.0, 0.0, 1.0), v(0.0, 0.0, -1.0)];
            pts.extend(polygon(3, 0.0, 0.0));
            pts
        }
        "SPY-5" => {
            let mut pts = vec![v(0.0, 0.0, 1.2)];
            pts.extend(polygon(4, -0.2, 0.0));
            pts
        }

        "OC-6" => vec![
            v(1.0, 0.0, 0.0),
            v(-1.0, 0.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, -1.0, 0.0),
            v(0.0, 0.0, 1.0),
            v(0.0, 0.0, -1.0),
        ],
        "TPR-6" => {
            let mut pts = polygon(3, 0.6, 0.0);
            pts.extend(polygon(3, -0.6, 0.0));
            pts
        }
        "PPY-6" => {
            let mut pts = vec![v(0.0, 0.0, 1.2)];
            pts.extend(polygon(5, -0.2, 0.0));
            pts
        }

        "PBPY-7" => {
            let mut pts = vec![v(0.0, 0.0, 1.0), v(0.0, 0.0, -1.0)];
            pts.extend(polygon(5, 0.0, 0.0));
            pts
        }
        "COC-7" => {
            let mut pts = vec![
                v(1.0, 0.0, 0.0),
                v(-1.0, 0.0, 0.0),
                v(0.0, 1.0, 0.0),
                v(0.0, -1.0, 0.0),
                v(0.0, 0.0, 1.0),
                v(0.0, 0.0, -1.0),
            ];
            // Cap above the (+x, +y, +z) octant face.
            pts.push(v(0.7, 0.7, 0.7));
            pts
        }
        "CTPR-7" => {
            let mut pts = polygon(3, 0.6, 0.0);
            pts.extend(polygon(3, -0.6, 0.0));
            // Cap above one of the rectangular side faces.
            pts.push(v(1.3, 0.0, 0.0));
            pts
        }

        "CU-8" => {
            let s = 1.0 / 3.0f64.sqrt();
            let mut pts = Vec::with_capacity(8);
            for &sx in &[-1.0, 1.0] {
                for &sy in &[-1.0, 1.0] {
                    for &sz in &[-1.0, 1.0] {
                        pts.push(v(sx * s, sy * s, sz * s));
                    }
                }
            }
            pts
        }
        "SAPR-8" => {
            let mut pts = polygon(4, 0.6, 0.0);
            pts.extend(polygon(4, -0.6, std::f64::consts::FRAC_PI_4));
            pts
        }
        "TDD-8" => {
            // D2d "snub disphenoid" style approximation: two staggered
            // rectangles of differing aspect ratio.
            let mut pts = vec![
                v(0.9, 0.4, 0.5),
                v(-0.9, 0.4, 0.5),
                v(0.9, -0.4, 0.5),
                v(-0.9, -0.4, 0.5),
            ];
            pts.extend(vec![
                v(0.4, 0.9, -0.5),
                v(-0.4, 0.9, -0.5),
                v(0.4, -0.9, -0.5),
                v(-0.4, -0.9, -0.5),
            ]);
            pts
        }
        "HBPY-8" => {
            let mut pts = vec![v(0.0, 0.0, 1.0), v(0.0, 0.0, -1.0)];
            pts.extend(polygon(6, 0.0, 0.0));
            pts
        }

        "TCTPR-9" => {
            let mut pts = polygon(3, 0.6, 0.0);
            pts.extend(polygon(3, -0.6, 0.0));
            // One cap per rectangular face, pushed outward along its normal.
            for i in 0..3 {
                let theta = std::f64::consts::TAU * (i as f64 + 0.5) / 3.0;
                pts.push(v(1.3 * theta.cos(), 1.3 * theta.sin(), 0.0));
            }
            pts
        }
        "CCU-9" => {
            let s = 1.0 / 3.0f64.sqrt();
            let mut pts = Vec::with_capacity(9);
            for &sx in &[-1.0, 1.0] {
                for &sy in &[-1.0, 1.0] {
                    for &sz in &[-1.0, 1.0] {
                        pts.push(v(sx * s, sy * s, sz * s));
                    }
                }
            }
            pts.push(v(0.0, 0.0, 1.3));
            pts
        }
        "CSAPR-9" => {
            let mut pts = polygon(4, 0.6, 0.0);
            pts.extend(polygon(4, -0.6, std::f64::consts::FRAC_PI_4));
            pts.push(v(0.0, 0.0, 1.3));
            pts
        }

        "PAPR-10" => {
            let mut pts = polygon(5, 0.6, 0.0);
            pts.extend(polygon(5, -0.6, std::f64::consts::PI / 5.0));
            pts
        }
        "OBPY-10" => {
            let mut pts = vec![v(0.0, 0.0, 1.0), v(0.0, 0.0, -1.0)];
            pts.extend(polygon(8, 0.0, 0.0));
            pts
        }

        "MPAPR-11" => {
            let mut pts = polygon(5, 0.6, 0.0);
            pts.extend(polygon(5, -0.6, std::f64::consts::PI / 5.0));
            pts.push(v(0.0, 0.0, 1.3));
            pts
        }

        "IC-12" => {
            let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
            let mut pts = Vec::with_capacity(12);
            for &s1 in &[-1.0, 1.0] {
                for &s2 in &[-1.0, 1.0] {
                    pts.push(v(0.0, s1 * 1.0, s2 * phi));
                    pts.push(v(s1 * 1.0, s2 * phi, 0.0));
                    pts.push(v(s1 * phi, 0.0, s2 * 1.0));
                }
            }
            pts
        }
        "COC-12" => {
            let mut pts = Vec::with_capacity(12);
            for &sa in &[-1.0, 1.0] {
                for &sb in &[-1.0, 1.0] {
                    pts.push(v(sa, sb, 0.0));
                    pts.push(v(sa, 0.0, sb));
                    pts.push(v(0.0, sa, sb));
                }
            }
            pts
        }

        _ => unreachable!("unknown reference code {code}"),
    }
}

fn entry(cn: usize, code: &str, name: &str, point_group: &str) -> ReferenceGeometry {
    ReferenceGeometry {
        code: code.to_string(),
        name: name.to_string(),
        point_group: point_group.to_string(),
        points: normalize(cn, raw_points(code)),
    }
    .also_assert_cn(cn)
}

impl ReferenceGeometry {
    /// Development-time sanity check: a CN = 3 entry stores 4 points (3
    /// ligand + center), every other CN stores exactly `cn` points.
    fn also_assert_cn(self, cn: usize) -> Self {
        let expected = if cn == 3 { 4 } else { cn };
        debug_assert_eq!(self.points.len(), expected, "{} has wrong point count", self.code);
        self
    }
}

fn build() -> HashMap<usize, Vec<ReferenceGeometry>> {
    let mut lib: HashMap<usize, Vec<ReferenceGeometry>> = HashMap::new();

    lib.insert(2, vec![
        entry(2, "L-2", "Linear", "Dooh"),
        entry(2, "A-2", "Angular", "C2v"),
    ]);
    lib.insert(3, vec![
        entry(3, "TP-3", "Trigonal planar", "D3h"),
        entry(3, "vT-3", "Pyramidal (vacant tetrahedron)", "C3v"),
        entry(3, "fac-vOC-3", "fac-Trivacant octahedron", "C3v"),
    ]);
    lib.insert(4, vec![
        entry(4, "SP-4", "Square planar", "D4h"),
        entry(4, "T-4", "Tetrahedron", "Td"),
        entry(4, "SS-4", "Seesaw (cis-divacant TBPY)", "C2v"),
    ]);
    lib.insert(5, vec![
        entry(5, "PP-5", "Pentagon", "D5h"),
        entry(5, "TBPY-5", "Trigonal bipyramid", "D3h"),
        entry(5, "SPY-5", "Square pyramid", "C4v"),
    ]);
    lib.insert(6, vec![
        entry(6, "OC-6", "Octahedron", "Oh"),
        entry(6, "TPR-6", "Trigonal prism", "D3h"),
        entry(6, "PPY-6", "Pentagonal pyramid", "C5v"),
    ]);
    lib.insert(7, vec![
        entry(7, "PBPY-7", "Pentagonal bipyramid", "D5h"),
        entry(7, "COC-7", "Capped octahedron", "C3v"),
        entry(7, "CTPR-7", "Capped trigonal prism", "C2v"),
    ]);
    lib.insert(8, vec![
        entry(8, "CU-8", "Cube", "Oh"),
        entry(8, "SAPR-8", "Square antiprism", "D4d"),
        entry(8, "TDD-8", "Triangular dodecahedron", "D2d"),
        entry(8, "HBPY-8", "Hexagonal bipyramid", "D6h"),
    ]);
    lib.insert(9, vec![
        entry(9, "TCTPR-9", "Tricapped trigonal prism", "D3h"),
        entry(9, "CCU-9", "Capped cube", "C4v"),
        entry(9, "CSAPR-9", "Capped square antiprism", "C4v"),
    ]);
    lib.insert(10, vec![
        entry(10, "PAPR-10", "Pentagonal antiprism", "D5d"),
        entry(10, "OBPY-10", "Octagonal bipyramid", "D8h"),
    ]);
    lib.insert(11, vec![
        entry(11, "MPAPR-11", "Monocapped pentagonal antiprism", "C5v"),
    ]);
    lib.insert(12, vec![
        entry(12, "IC-12", "Icosahedron", "Ih"),
        entry(12, "COC-12", "Cuboctahedron", "Oh"),
    ]);

    lib
}

static LIBRARY: OnceLock<HashMap<usize, Vec<ReferenceGeometry>>> = OnceLock::new();

/// The full reference library, built once on first access.
pub struct ReferenceLibrary;

impl ReferenceLibrary {
    /// All reference geometries registered for a given coordination number,
    /// or an empty slice if none are known (§7's `NoReference` error kind).
    pub fn for_cn(cn: usize) -> &'static [ReferenceGeometry] {
        LIBRARY
            .get_or_init(build)
            .get(&cn)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn known_cns() -> Vec<usize> {
        let mut cns: Vec<usize> = LIBRARY.get_or_init(build).keys().copied().collect();
        cns.sort_unstable();
        cns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn every_geometry_is_rms_normalized() {
        for cn in ReferenceLibrary::known_cns() {
            for geo in ReferenceLibrary::for_cn(cn) {
                let n = geo.points.len() as f64;
                let mean_sq: f64 = geo.points.iter().map(|p| p.norm_sq()).sum::<f64>() / n;
                assert_abs_diff_eq!(mean_sq.sqrt(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn cn_ge_4_geometries_are_also_centered() {
        for cn in ReferenceLibrary::known_cns().into_iter().filter(|&cn| cn != 3) {
            for geo in ReferenceLibrary::for_cn(cn) {
                let n = geo.points.len() as f64;
                let centroid = geo.points.iter().fold(Vec3::ZERO, |a, &p| a + p) * (1.0 / n);
                assert_abs_diff_eq!(centroid.norm(), 0.0, epsilon = 1e-9, "{} not centered", geo.code);
            }
        }
    }

    #[test]
    fn cn3_entries_carry_four_points() {
        for geo in ReferenceLibrary::for_cn(3) {
            assert_eq!(geo.n(), 4, "{} should have 4 points (3 ligand + center)", geo.code);
        }
    }

    #[test]
    fn unknown_cn_returns_empty() {
        assert!(ReferenceLibrary::for_cn(13).is_empty());
    }

    #[test]
    fn codes_within_a_cn_are_unique() {
        for cn in ReferenceLibrary::known_cns() {
            let codes: Vec<&str> = ReferenceLibrary::for_cn(cn).iter().map(|g| g.code.as_str()).collect();
            let mut sorted = codes.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), codes.len(), "duplicate code in CN={cn}");
        }
    }

    #[test]
    fn octahedron_matches_itself_with_zero_measure() {
        use crate::kabsch;
        use crate::shape_eval;
        use crate::types::ScaleMode;

        let oc6 = ReferenceLibrary::for_cn(6).iter().find(|g| g.code == "OC-6").unwrap();
        let rotation = kabsch::kabsch_rotation(&oc6.points, &oc6.points);
        let result = shape_eval::evaluate(&rotation, &oc6.points, &oc6.points, ScaleMode::Optimal);
        assert!(result.measure < 1e-6);
    }
}
