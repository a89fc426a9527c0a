//! Core data model: immutable inputs (`Atom`, `Structure`), derived
//! per-analysis records (`CoordAtom`, `ShapeResult`, `GeometryResult`,
//! `AnalysisResult`, `BatchResult`), and the small set of configuration /
//! progress types threaded through the engine.
//!
//! Identity throughout is by integer index into the owning sequence — there
//! are no back-references and no cycles, unlike the mutable object graphs a
//! UI layer might use.

use crate::linalg::{Mat3, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One atom of an input structure. Immutable; identity is its index within
/// the owning `Structure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub element: String,
    pub pos: Vec3,
}

/// An ordered sequence of atoms plus display metadata, as handed in by an
/// external structure loader (XYZ/CIF parsing is out of the core's scope —
/// see `src/bin/cshm.rs` for a minimal reader used by the CLI demo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub name: String,
    pub atoms: Vec<Atom>,
    /// Set for multi-frame trajectories (e.g. multi-frame XYZ).
    pub frame_index: Option<usize>,
    /// File path or other provenance tag, opaque to the core.
    pub source: Option<String>,
}

impl Structure {
    pub fn new(name: impl Into<String>, atoms: Vec<Atom>) -> Self {
        Self { name: name.into(), atoms, frame_index: None, source: None }
    }
}

/// One coordinating atom, derived from a `Structure` and a chosen center.
/// Invariant: `distance == vec.norm()` and `distance > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordAtom {
    /// Index of the source atom within its owning `Structure`.
    pub atom_index: usize,
    pub element: String,
    /// Vector from the center to this atom.
    pub vec: Vec3,
    pub distance: f64,
}

impl CoordAtom {
    pub fn new(atom_index: usize, element: String, vec: Vec3) -> Self {
        let distance = vec.norm();
        Self { atom_index, element, vec, distance }
    }
}

/// An immutable, pre-normalized reference polyhedron: centroid at the
/// origin, RMS distance from the origin equal to 1 (CN ≥ 4; CN = 3 entries
/// additionally carry a central-atom point per §4.7's documented exception).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceGeometry {
    pub code: String,
    pub name: String,
    pub point_group: String,
    pub points: Vec<Vec3>,
}

impl ReferenceGeometry {
    pub fn n(&self) -> usize {
        self.points.len()
    }
}

/// Optimization profile selecting the Optimizer's numeric parameters.
/// Stage structure (§4.5) is identical across profiles; only iteration
/// counts / thresholds differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    Default,
    Intensive,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Default
    }
}

/// Which CShM variant `ShapeEval` computes. See SPEC_FULL.md §4 for the
/// resolution of this as an explicit Open Question in the source spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Rigid variant: no scale freedom, S = 100 * mean ||P' - Q||^2.
    Fixed,
    /// Optimal-scale variant: scale s* fit per-reference from the aligned
    /// dot product. This is the crate's default.
    Optimal,
}

impl Default for ScaleMode {
    fn default() -> Self {
        ScaleMode::Optimal
    }
}

/// Typed run configuration, replacing a dynamic options bag. Validated at
/// construction by `Analyzer`/`BatchDriver` entry points.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub flexible: bool,
    pub seed: u64,
    pub timeout: Option<Duration>,
    pub scale_mode: ScaleMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Default,
            flexible: false,
            seed: 0,
            timeout: None,
            scale_mode: ScaleMode::Optimal,
        }
    }
}

/// The Optimizer's fixed set of progress stages, reported in non-decreasing
/// order within a single analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Kabsch,
    KeyOrientations,
    GridSearch,
    Annealing,
    Refinement,
    Complete,
}

/// One progress update emitted by the Optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Approximate, monotonically non-decreasing within a stage sequence
    /// (except the jump to `Complete`).
    pub percent: u8,
    pub best_so_far: f64,
    pub extra: Option<String>,
}

/// A cooperative cancellation flag, consulted at the suspension points
/// declared in SPEC_FULL.md §5. Cheap to clone; all clones observe the same
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one `ShapeEval` call against a candidate rotation. `measure`
/// is finite iff `assignment` is a valid permutation; a failed evaluation
/// reports `f64::INFINITY` with the identity rotation (§4.5's failure
/// semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeResult {
    pub measure: f64,
    pub rotation: Mat3,
    /// `assignment[i]` is the reference-vertex index matched to actual
    /// point `i`.
    pub assignment: Vec<usize>,
    pub scale: f64,
    /// Rotated actual coordinates, reordered so index `i` matches reference
    /// vertex `i`.
    pub aligned: Vec<Vec3>,
}

impl ShapeResult {
    pub fn failed() -> Self {
        Self {
            measure: f64::INFINITY,
            rotation: Mat3::IDENTITY,
            assignment: Vec::new(),
            scale: 1.0,
            aligned: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.measure.is_finite()
    }
}

/// A flexible-extension result: the rigid best alongside the best
/// anisotropically-scaled match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlexibleResult {
    pub rigid_measure: f64,
    pub flexible_measure: f64,
    /// `S_rigid - S_flex`, clamped to `>= 0`.
    pub delta: f64,
    pub scale: Vec3,
    /// Standard deviation of `(sx, sy, sz)` divided by their mean.
    pub distortion_index: f64,
    pub description: String,
}

/// One reference's result within a single analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryResult {
    pub reference_code: String,
    pub reference_name: String,
    pub point_group: String,
    pub shape: ShapeResult,
    pub flexible: Option<FlexibleResult>,
}

/// Bond-length and inter-ligand-angle statistics computed from the
/// coordination sphere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondStats {
    pub mean_distance: f64,
    pub std_distance: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    pub angle_count: usize,
    pub mean_angle: f64,
    pub std_angle: f64,
    pub min_angle: f64,
    pub max_angle: f64,
}

/// Derived quality indices computed against the best-matching reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIndices {
    /// Defined only when the actual and ideal angle lists are equal length.
    pub angular_distortion: Option<f64>,
    pub bond_length_uniformity_pct: f64,
    pub approx_rmsd: f64,
    pub overall_score: f64,
}

/// Result of one (structure, center) analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub structure_name: String,
    pub center_index: usize,
    pub cn: usize,
    /// Ascending by measure.
    pub rankings: Vec<GeometryResult>,
    pub best_index: Option<usize>,
    pub bond_stats: Option<BondStats>,
    pub quality: Option<QualityIndices>,
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn best(&self) -> Option<&GeometryResult> {
        self.best_index.and_then(|i| self.rankings.get(i))
    }

    pub fn with_error(structure_name: String, center_index: usize, cn: usize, error: impl Into<String>) -> Self {
        Self {
            structure_name,
            center_index,
            cn,
            rankings: Vec::new(),
            best_index: None,
            bond_stats: None,
            quality: None,
            error: Some(error.into()),
        }
    }
}

/// Per-structure progress within a `BatchDriver` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub structure_name: String,
    pub stage: Stage,
}

/// The state machine of a batch run (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    Running,
    Complete,
    Cancelled,
    Error,
}

/// Result of running `BatchDriver` over many (structure, selection) pairs,
/// preserving input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub state: BatchState,
    /// Indexed identically to the input list; `None` where analysis never
    /// ran (e.g. cancelled before reaching that structure).
    pub results: Vec<Option<AnalysisResult>>,
    /// At most one error string per structure.
    pub errors: Vec<Option<String>>,
}
