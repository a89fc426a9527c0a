//! Optimal rotation between two ordered point sets via SVD of the
//! cross-covariance matrix (Kabsch algorithm).
//!
//! Grounded on the closed-form Kabsch–Umeyama construction: center both
//! sets, form `H = Pᵀ Q`, decompose `H = U Σ Vᵀ`, and take `R = V Uᵀ`,
//! flipping the sign of the last column of `V` when `det(R) < 0` so the
//! returned rotation is always proper (`det(R) = +1`).

use crate::linalg::{svd3, Mat3, Vec3};

/// Returns the rotation `R` minimizing `Σᵢ ‖R pᵢ − qᵢ‖²` over proper
/// rotations, given two equal-length ordered point sets already assumed to
/// be in the same reference frame (both pre-centered by the caller when
/// centroid alignment matters; this engine's inputs are centroid-free by
/// construction — see [`crate::coordination`]).
///
/// Falls back to the identity rotation, logging a warning, if:
/// - the two slices have different lengths,
/// - either is empty,
/// - the SVD or subsequent reconstruction fails numerically.
///
/// An early exit also returns the identity when every corresponding pair of
/// points already coincides to within `1e-10` — avoids an unnecessary SVD
/// on already-aligned input.
pub fn kabsch_rotation(p: &[Vec3], q: &[Vec3]) -> Mat3 {
    if p.len() != q.len() || p.is_empty() {
        tracing::warn!(
            p_len = p.len(),
            q_len = q.len(),
            "kabsch: size mismatch or empty input, returning identity"
        );
        return Mat3::IDENTITY;
    }

    if p.iter().zip(q.iter()).all(|(&pi, &qi)| (pi - qi).norm() < 1e-10) {
        return Mat3::IDENTITY;
    }

    // Cross-covariance H = Pᵀ Q, built column-by-column: H[i][j] = Σ_k p_k[i] * q_k[j].
    let mut h = Mat3::zero();
    for (pi, qi) in p.iter().zip(q.iter()) {
        let pc = [pi.x, pi.y, pi.z];
        let qc = [qi.x, qi.y, qi.z];
        for i in 0..3 {
            for j in 0..3 {
                h.rows[i][j] += pc[i] * qc[j];
            }
        }
    }

    let svd = svd3(h);
    let mut v = svd.v;
    let mut r = v.matmul(&svd.u.transpose());

    if r.determinant() < 0.0 {
        v.negate_col(2);
        r = v.matmul(&svd.u.transpose());
    }

    if !r.rows.iter().flatten().all(|x| x.is_finite()) {
        tracing::warn!("kabsch: non-finite rotation recovered from SVD, returning identity");
        return Mat3::IDENTITY;
    }

    r
}
