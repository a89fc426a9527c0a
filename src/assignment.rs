//! Linear sum assignment: find the permutation `π` on `{0..N}` minimizing
//! `Σᵢ C[i, π(i)]` over a square, nonnegative cost matrix.
//!
//! Two code paths share one contract:
//! - `N ≤ 3`: exhaustive permutation search. With at most 6 permutations to
//!   check this is both the fastest option and, unlike a pick-the-smallest-
//!   cell greedy, is genuinely globally optimal — a naive greedy can be
//!   beaten by an alternative pairing even at N=2 (pick the smallest cell,
//!   get boxed into a large remainder). See DESIGN.md for why this crate
//!   departs from a literal greedy reading here.
//! - `N ≥ 4`: the O(N³) Kuhn–Munkres (Hungarian) algorithm with row/column
//!   potentials, the standard dense formulation.
//!
//! `NaN` costs are treated as `+∞` so the matrix stays totally ordered and a
//! valid permutation is always produced.

/// One matched (row, col) pair. A solution is a `Vec<Assignment>` covering
/// every row and every column exactly once.
pub type Assignment = (usize, usize);

fn sanitize(cost: &[Vec<f64>]) -> Vec<Vec<f64>> {
    cost.iter()
        .map(|row| {
            row.iter()
                .map(|&c| if c.is_nan() { f64::INFINITY } else { c })
                .collect()
        })
        .collect()
}

/// Solves the linear sum assignment problem on a square cost matrix.
/// Returns `N` pairs `(row, col)`, one per row, covering every column
/// exactly once. `N = 0` returns an empty vector.
///
/// # Panics
/// Panics if `cost` is not square (every row must have length `cost.len()`).
pub fn solve(cost: &[Vec<f64>]) -> Vec<Assignment> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    assert!(cost.iter().all(|row| row.len() == n), "cost matrix must be square");

    let cost = sanitize(cost);

    if n <= 3 {
        brute_force(&cost)
    } else {
        hungarian(&cost)
    }
}

/// Total cost of an assignment under the given (unsanitized) cost matrix.
pub fn total_cost(cost: &[Vec<f64>], assignment: &[Assignment]) -> f64 {
    assignment.iter().map(|&(i, j)| cost[i][j]).sum()
}

fn brute_force(cost: &[Vec<f64>]) -> Vec<Assignment> {
    let n = cost.len();
    let mut cols: Vec<usize> = (0..n).collect();
    let mut best_cols = cols.clone();
    let mut best_cost = f64::INFINITY;

    permute(&mut cols, 0, &mut |perm| {
        let c: f64 = (0..n).map(|i| cost[i][perm[i]]).sum();
        if c < best_cost {
            best_cost = c;
            best_cols = perm.to_vec();
        }
    });

    (0..n).map(|i| (i, best_cols[i])).collect()
}

/// Heap's algorithm, small-N permutation enumeration.
fn permute(arr: &mut [usize], k: usize, visit: &mut impl FnMut(&[usize])) {
    let n = arr.len();
    if k == n {
        visit(arr);
        return;
    }
    for i in k..n {
        arr.swap(k, i);
        permute(arr, k + 1, visit);
        arr.swap(k, i);
    }
}

/// Kuhn–Munkres algorithm with row/column potentials (the classic
/// `O(N^3)` dense formulation, 1-indexed internally to keep the
/// potential/"way" bookkeeping exactly as in the standard reference
/// presentation of this algorithm).
fn hungarian(cost: &[Vec<f64>]) -> Vec<Assignment> {
    let n = cost.len();
    const INF: f64 = f64::INFINITY;

    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row (1-indexed) assigned to column j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![INF; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0usize;

            for j in 1..=n {
                if !used[j] {
                    let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            result[p[j] - 1] = j - 1;
        }
    }
    (0..n).map(|i| (i, result[i])).collect()
}
