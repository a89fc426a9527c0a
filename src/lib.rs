//! # cshm — Continuous Shape Measure engine for coordination polyhedra
//!
//! ## Architecture overview
//!
//! Given a central atom and the atoms coordinating it, this crate answers
//! "which idealized polyhedron does this arrangement most resemble, and how
//! closely?" by computing the Continuous Shape Measure (CShM) of the actual
//! geometry against every reference polyhedron registered for the observed
//! coordination number, after jointly optimizing over rotation, vertex
//! assignment, and (optionally) scale.
//!
//! ### Why fixed-size 3×3 linear algebra instead of a general crate
//!
//! Every vector here lives in ℝ³ and every rotation is a 3×3 orthogonal
//! matrix. [`linalg`] hand-rolls a stack-allocated `Vec3`/`Mat3`/SVD rather
//! than reaching for `nalgebra`'s dynamically-sized types: the optimizer
//! evaluates tens of thousands of candidate rotations per shape measurement,
//! and a fixed 3-dimensional representation keeps that inner loop
//! allocation-free.
//!
//! ### Why assignment is split by size
//!
//! [`assignment`] brute-forces small vertex-matching problems (`N <= 3`) by
//! enumerating permutations, and falls back to the Hungarian algorithm
//! (`O(N^3)`) above that. A literal "pick the smallest entry" greedy rule is
//! not globally optimal even at `N = 2` (see that module's tests) — exact
//! search is cheap enough at small `N` that there is no reason to risk it.
//!
//! ### Why determinism matters
//!
//! [`optimizer`] and [`flexible`] draw randomized proposals (simulated
//! annealing, random restarts). [`rng`] wraps `rand_chacha::ChaCha8Rng`
//! specifically because its bit-stream is stable across `rand` versions —
//! unlike `StdRng`, whose algorithm is an implementation detail — so the
//! same seed reproduces the same search trajectory indefinitely.
//!
//! ### Concurrency model
//!
//! [`batch`] fans independent (structure, center) analyses across `rayon`'s
//! global thread pool, giving each task its own [`analyzer::Analyzer`]
//! (and therefore its own [`cache::Cache`]) rather than sharing one behind a
//! lock — there is no cross-task state to contend over. Single analyses
//! cooperate with cancellation and deadlines via [`types::CancelToken`],
//! checked at the suspension points each [`optimizer`] stage declares.
//!
//! ### What this crate does not do
//!
//! Structure loading (CIF/XYZ parsing) and report rendering are external
//! concerns, consumed only through this crate's plain data types
//! (`serde`-serializable where it matters) — see `src/bin/cshm.rs` for a
//! minimal demonstration reader, which deliberately lives outside the
//! library.

// Global allocator: mimalloc's per-thread heaps keep small allocations
// cheap and nearly contention-free, which matters here because `optimizer`
// and `flexible` allocate short-lived `Vec<Vec3>` candidates on every
// annealing step and `batch` runs many analyses concurrently across rayon's
// pool.
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod analyzer;
pub mod assignment;
pub mod batch;
pub mod cache;
pub mod coordination;
pub mod error;
pub mod flexible;
pub mod kabsch;
pub mod linalg;
pub mod optimizer;
pub mod quality;
pub mod reference_library;
pub mod rng;
pub mod shape_eval;
pub mod types;

pub use analyzer::Analyzer;
pub use batch::{run as run_batch, BatchItem};
pub use error::CshmError;
pub use reference_library::ReferenceLibrary;
pub use types::{
    AnalysisResult, Atom, BatchResult, BatchState, BondStats, CancelToken, CoordAtom, FlexibleResult,
    GeometryResult, Mode, ProgressEvent, QualityIndices, ReferenceGeometry, RunConfig, ScaleMode, ShapeResult,
    Stage, Structure,
};
