//! Fixed 3×3 linear algebra: vectors, matrices, determinant, and a Jacobi-based
//! SVD. Everything here is fixed-size and allocation-free — the rest of the
//! crate never reaches for a general-purpose linear algebra crate because
//! every operation in the core is bounded to 3 dimensions.
//!
//! ### Why hand-rolled instead of `nalgebra`
//!
//! The optimizer evaluates tens of thousands of 3×3 SVDs per shape
//! measurement (one per candidate rotation per reference). A fixed-size,
//! stack-allocated representation avoids the heap traffic and dynamic-size
//! bookkeeping a general `DMatrix` carries, and keeps every hot-path
//! operation inlinable.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Jacobi rotation sweep tolerance: stop once the largest off-diagonal
/// element of `AᵀA` is below this.
pub const JACOBI_TOL: f64 = 1e-10;
/// Hard cap on Jacobi sweeps. The algorithm converges quadratically; 50
/// sweeps is generous headroom for any real 3×3 input.
pub const JACOBI_MAX_ITER: usize = 50;

/// A point or direction in ℝ³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn norm_sq(self) -> f64 {
        self.dot(self)
    }

    /// Returns a unit vector, or `None` if `self` is (numerically) the zero vector.
    pub fn normalized(self) -> Option<Vec3> {
        let n = self.norm();
        if n > 1e-12 {
            Some(self * (1.0 / n))
        } else {
            None
        }
    }

    pub fn component_mul(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// A 3×3 matrix in row-major form: `rows[r][c]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat3 {
    pub rows: [[f64; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub fn zero() -> Self {
        Mat3 { rows: [[0.0; 3]; 3] }
    }

    pub fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Mat3 {
            rows: [
                [c0.x, c1.x, c2.x],
                [c0.y, c1.y, c2.y],
                [c0.z, c1.z, c2.z],
            ],
        }
    }

    pub fn col(&self, j: usize) -> Vec3 {
        Vec3::new(self.rows[0][j], self.rows[1][j], self.rows[2][j])
    }

    pub fn row(&self, i: usize) -> Vec3 {
        Vec3::new(self.rows[i][0], self.rows[i][1], self.rows[i][2])
    }

    pub fn transpose(&self) -> Mat3 {
        let mut m = Mat3::zero();
        for i in 0..3 {
            for j in 0..3 {
                m.rows[j][i] = self.rows[i][j];
            }
        }
        m
    }

    pub fn matmul(&self, other: &Mat3) -> Mat3 {
        let mut m = Mat3::zero();
        for i in 0..3 {
            for j in 0..3 {
                let mut acc = 0.0;
                for k in 0..3 {
                    acc += self.rows[i][k] * other.rows[k][j];
                }
                m.rows[i][j] = acc;
            }
        }
        m
    }

    /// Applies this matrix to a column vector: `self * v`.
    pub fn apply(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.rows[0][0] * v.x + self.rows[0][1] * v.y + self.rows[0][2] * v.z,
            self.rows[1][0] * v.x + self.rows[1][1] * v.y + self.rows[1][2] * v.z,
            self.rows[2][0] * v.x + self.rows[2][1] * v.y + self.rows[2][2] * v.z,
        )
    }

    pub fn determinant(&self) -> f64 {
        let r = &self.rows;
        r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0])
    }

    /// Negates column `j` in place. Used to flip a reflection into a proper
    /// rotation (det < 0 -> det > 0).
    pub fn negate_col(&mut self, j: usize) {
        for i in 0..3 {
            self.rows[i][j] = -self.rows[i][j];
        }
    }

    /// Euler-angle (Z-Y-X / yaw-pitch-roll) rotation matrix construction,
    /// used by the optimizer's key-orientation and annealing stages.
    pub fn from_euler(alpha: f64, beta: f64, gamma: f64) -> Mat3 {
        let (ca, sa) = (alpha.cos(), alpha.sin());
        let (cb, sb) = (beta.cos(), beta.sin());
        let (cg, sg) = (gamma.cos(), gamma.sin());
        Mat3 {
            rows: [
                [ca * cb, ca * sb * sg - sa * cg, ca * sb * cg + sa * sg],
                [sa * cb, sa * sb * sg + ca * cg, sa * sb * cg - ca * sg],
                [-sb, cb * sg, cb * cg],
            ],
        }
    }

    /// Rodrigues' rotation formula: a proper rotation by `angle` radians
    /// about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Mat3 {
        let (c, s) = (angle.cos(), angle.sin());
        let t = 1.0 - c;
        let (x, y, z) = (axis.x, axis.y, axis.z);
        Mat3 {
            rows: [
                [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
                [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
                [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
            ],
        }
    }
}

/// Result of a 3×3 SVD: `a = u * diag(singular_values) * v.transpose()`.
/// Singular values are sorted descending. `u` and `v` are orthonormal.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    pub u: Mat3,
    pub singular_values: Vec3,
    pub v: Mat3,
}

/// Diagonalizes a symmetric 3×3 matrix by cyclic Jacobi rotations, pivoting
/// on the largest off-diagonal element each sweep until it drops below
/// `tol` or `max_iter` sweeps elapse. Returns `(eigenvectors, eigenvalues)`
/// where `eigenvectors` has the eigenvectors as columns, matched
/// index-for-index with `eigenvalues`.
fn jacobi_eigen_symmetric(mut a: Mat3, tol: f64, max_iter: usize) -> (Mat3, Vec3) {
    let mut v = Mat3::IDENTITY;

    for _ in 0..max_iter {
        // Locate the largest off-diagonal magnitude.
        let (mut p, mut q) = (0usize, 1usize);
        let mut max_val = a.rows[0][1].abs();
        for &(i, j) in &[(0usize, 2usize), (1, 2)] {
            if a.rows[i][j].abs() > max_val {
                max_val = a.rows[i][j].abs();
                p = i;
                q = j;
            }
        }

        if max_val < tol {
            break;
        }

        let app = a.rows[p][p];
        let aqq = a.rows[q][q];
        let apq = a.rows[p][q];

        let theta = if (app - aqq).abs() < 1e-300 {
            std::f64::consts::FRAC_PI_4 * apq.signum()
        } else {
            0.5 * ((2.0 * apq) / (app - aqq)).atan()
        };
        let (c, s) = (theta.cos(), theta.sin());

        // A' = GᵀAG for the Givens rotation G acting on rows/cols (p, q).
        let mut a_new = a;
        for k in 0..3 {
            let akp = a.rows[k][p];
            let akq = a.rows[k][q];
            a_new.rows[k][p] = c * akp - s * akq;
            a_new.rows[k][q] = s * akp + c * akq;
        }
        a = a_new;
        let mut a_final = a;
        for k in 0..3 {
            let apk = a.rows[p][k];
            let aqk = a.rows[q][k];
            a_final.rows[p][k] = c * apk - s * aqk;
            a_final.rows[q][k] = s * apk + c * aqk;
        }
        a = a_final;

        // Accumulate V <- V * G.
        let mut v_new = v;
        for k in 0..3 {
            let vkp = v.rows[k][p];
            let vkq = v.rows[k][q];
            v_new.rows[k][p] = c * vkp - s * vkq;
            v_new.rows[k][q] = s * vkp + c * vkq;
        }
        v = v_new;
    }

    let eigenvalues = Vec3::new(a.rows[0][0], a.rows[1][1], a.rows[2][2]);
    (v, eigenvalues)
}

/// Computes the SVD of a general 3×3 matrix via eigendecomposition of
/// `AᵀA` (symmetric, positive semi-definite): `AᵀA = VΛVᵀ`, singular values
/// `σᵢ = √max(0, λᵢ)`, `U = AVdiag(1/σᵢ)` for `σᵢ` above tolerance.
///
/// Columns of `U` corresponding to (numerically) zero singular values are
/// filled by Gram-Schmidt orthogonalization against the columns already
/// computed, falling back to a cross product against the standard basis
/// when Gram-Schmidt itself degenerates (e.g. `A` is rank 0 or 1).
pub fn svd3(a: Mat3) -> Svd3 {
    let ata = a.transpose().matmul(&a);
    let (v_raw, eig_raw) = jacobi_eigen_symmetric(ata, JACOBI_TOL, JACOBI_MAX_ITER);

    // Sort eigenpairs descending by eigenvalue so singular values come out
    // in the conventional SVD order.
    let mut idx = [0usize, 1, 2];
    let eig = [eig_raw.x, eig_raw.y, eig_raw.z];
    idx.sort_by(|&i, &j| eig[j].partial_cmp(&eig[i]).unwrap());

    let v = Mat3::from_cols(v_raw.col(idx[0]), v_raw.col(idx[1]), v_raw.col(idx[2]));
    let singular_values = Vec3::new(
        eig[idx[0]].max(0.0).sqrt(),
        eig[idx[1]].max(0.0).sqrt(),
        eig[idx[2]].max(0.0).sqrt(),
    );
    let sigmas = [singular_values.x, singular_values.y, singular_values.z];

    let mut u_cols: [Option<Vec3>; 3] = [None; 3];
    for i in 0..3 {
        if sigmas[i] > JACOBI_TOL {
            u_cols[i] = Some(a.apply(v.col(i)) * (1.0 / sigmas[i]));
        }
    }

    // Fill any missing columns: Gram-Schmidt against the columns already
    // fixed, falling back to cross products with the standard basis when
    // that degenerates too (e.g. A is the zero matrix).
    for i in 0..3 {
        if u_cols[i].is_some() {
            continue;
        }
        let candidates = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let mut chosen = None;
        for cand in candidates {
            let mut w = cand;
            for col in u_cols.iter().flatten() {
                w = w - *col * w.dot(*col);
            }
            if let Some(n) = w.normalized() {
                chosen = Some(n);
                break;
            }
        }
        u_cols[i] = chosen.or_else(|| {
            // Last resort: cross product of whatever columns exist.
            let known: Vec<Vec3> = u_cols.iter().flatten().copied().collect();
            if known.len() == 2 {
                known[0].cross(known[1]).normalized()
            } else {
                None
            }
        });
        if u_cols[i].is_none() {
            u_cols[i] = Some(candidates[i]);
        }
    }

    let u = Mat3::from_cols(u_cols[0].unwrap(), u_cols[1].unwrap(), u_cols[2].unwrap());

    Svd3 { u, singular_values, v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn is_orthonormal(m: &Mat3) -> bool {
        let mt_m = m.transpose().matmul(m);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                if (mt_m.rows[i][j] - expected).abs() > 1e-8 {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn identity_svd_is_trivial() {
        let svd = svd3(Mat3::IDENTITY);
        assert_abs_diff_eq!(svd.singular_values.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(svd.singular_values.y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(svd.singular_values.z, 1.0, epsilon = 1e-9);
        assert!(is_orthonormal(&svd.u));
        assert!(is_orthonormal(&svd.v));
    }

    #[test]
    fn svd_reconstructs_random_matrix() {
        let a = Mat3 {
            rows: [[1.0, 2.0, 3.0], [0.5, -1.0, 2.0], [4.0, 0.0, -2.0]],
        };
        let svd = svd3(a);
        assert!(is_orthonormal(&svd.u));
        assert!(is_orthonormal(&svd.v));

        let sigma = Mat3 {
            rows: [
                [svd.singular_values.x, 0.0, 0.0],
                [0.0, svd.singular_values.y, 0.0],
                [0.0, 0.0, svd.singular_values.z],
            ],
        };
        let reconstructed = svd.u.matmul(&sigma).matmul(&svd.v.transpose());
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(reconstructed.rows[i][j], a.rows[i][j], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn svd_of_rank_deficient_matrix_still_orthonormal() {
        // Rank-1 matrix: every column a multiple of (1,0,0).
        let a = Mat3 {
            rows: [[2.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        };
        let svd = svd3(a);
        assert!(is_orthonormal(&svd.u));
        assert!(is_orthonormal(&svd.v));
    }

    #[test]
    fn svd_of_zero_matrix_fills_with_standard_basis() {
        let svd = svd3(Mat3::zero());
        assert!(is_orthonormal(&svd.u));
        assert!(is_orthonormal(&svd.v));
        assert_abs_diff_eq!(svd.singular_values.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn determinant_matches_known_value() {
        let m = Mat3 {
            rows: [[1.0, 0.0, 2.0], [-1.0, 3.0, 1.0], [0.0, -1.0, 4.0]],
        };
        assert_abs_diff_eq!(m.determinant(), 17.0, epsilon = 1e-12);
    }

    #[test]
    fn axis_angle_rotation_is_proper() {
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let r = Mat3::from_axis_angle(axis, std::f64::consts::FRAC_PI_2);
        assert!(is_orthonormal(&r));
        assert_abs_diff_eq!(r.determinant(), 1.0, epsilon = 1e-9);
        let rotated = r.apply(Vec3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(rotated.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rotated.y, 1.0, epsilon = 1e-9);
    }
}
