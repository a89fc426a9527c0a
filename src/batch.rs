//! Parallel fan-out across independent analyses (§4.11, §5). Each item gets
//! its own `Analyzer` (own cache), matching the teacher's pattern of giving
//! each `rayon` worker a private resource rather than sharing one behind a
//! lock. Results are collected back into input order — `rayon`'s indexed
//! `collect` preserves it, so no explicit re-sort is needed.

use crate::analyzer::Analyzer;
use crate::types::{AnalysisResult, BatchProgress, BatchResult, BatchState, CancelToken, CoordAtom, RunConfig, Stage};
use rayon::prelude::*;

/// One unit of batch work: a coordination sphere already selected (by
/// `coordination`) for one (structure, center atom) pair.
pub struct BatchItem {
    pub structure_name: String,
    pub center_index: usize,
    pub atoms: Vec<CoordAtom>,
}

/// Runs `items` across the `rayon` global pool. `progress` may be called
/// concurrently from multiple worker threads and must be `Sync`.
pub fn run(items: &[BatchItem], config: &RunConfig, cancel: &CancelToken, progress: impl Fn(BatchProgress) + Sync) -> BatchResult {
    let total = items.len();
    if total == 0 {
        return BatchResult { state: BatchState::Complete, results: Vec::new(), errors: Vec::new() };
    }

    let outcomes: Vec<(Option<AnalysisResult>, Option<String>)> = items
        .par_iter()
        .enumerate()
        .map(|(i, item)| {
            if cancel.is_cancelled() {
                return (None, None);
            }
            progress(BatchProgress {
                current: i + 1,
                total,
                structure_name: item.structure_name.clone(),
                stage: Stage::Kabsch,
            });

            let analyzer = Analyzer::new();
            match analyzer.analyze(item.structure_name.clone(), item.center_index, &item.atoms, config, cancel, |_, _| {}) {
                Ok(result) => {
                    let err = result.error.clone();
                    (Some(result), err)
                }
                Err(e) => {
                    tracing::error!(structure = %item.structure_name, error = %e, "batch item failed internally");
                    (None, Some(e.message()))
                }
            }
        })
        .collect();

    let (results, errors): (Vec<Option<AnalysisResult>>, Vec<Option<String>>) = outcomes.into_iter().unzip();

    let state = if cancel.is_cancelled() {
        BatchState::Cancelled
    } else if results.iter().any(Option::is_none) {
        BatchState::Error
    } else {
        BatchState::Complete
    };

    BatchResult { state, results, errors }
}
