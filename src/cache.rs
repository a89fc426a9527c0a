//! Fingerprint-keyed memoization of `AnalysisResult` (§6): identical
//! coordination spheres under the same run configuration don't re-run the
//! optimizer. `parking_lot::RwLock` guards the map, matching the teacher's
//! choice of `parking_lot` over the standard library's mutex for this kind
//! of frequently-read, occasionally-written shared state.

use crate::types::{AnalysisResult, CoordAtom, Mode};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Builds the cache key described in §6: mode, coordination number, rigid
/// vs. flexible, then the coordinating elements and distances sorted so
/// that two chemically-identical spheres fingerprint identically regardless
/// of input atom order.
pub fn fingerprint(mode: Mode, cn: usize, flexible: bool, atoms: &[CoordAtom]) -> String {
    let mode_str = match mode {
        Mode::Default => "default",
        Mode::Intensive => "intensive",
    };
    let flex_str = if flexible { "flex" } else { "rigid" };

    let mut pairs: Vec<(String, f64)> = atoms.iter().map(|a| (a.element.clone(), round3(a.distance))).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.partial_cmp(&b.1).unwrap()));

    let body = pairs.iter().map(|(e, d)| format!("{e}{d:.3}")).collect::<Vec<_>>().join("-");
    format!("{mode_str}-cn{cn}-{flex_str}-{body}")
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// In-memory result cache, shared by reference within one `Analyzer`. Per
/// §7's propagation policy, cancelled analyses are never inserted.
#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, AnalysisResult>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<AnalysisResult> {
        self.entries.read().get(key).cloned()
    }

    pub fn put(&self, key: String, result: AnalysisResult) {
        self.entries.write().insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vec3;

    fn atoms() -> Vec<CoordAtom> {
        vec![
            CoordAtom::new(0, "Cl".to_string(), Vec3::new(2.0, 0.0, 0.0)),
            CoordAtom::new(1, "Cl".to_string(), Vec3::new(-2.0, 0.0, 0.0)),
        ]
    }

    #[test]
    fn fingerprint_is_stable_under_reordering() {
        let mut a = atoms();
        let f1 = fingerprint(Mode::Default, 2, false, &a);
        a.reverse();
        let f2 = fingerprint(Mode::Default, 2, false, &a);
        assert_eq!(f1, f2);
    }

    #[test]
    fn fingerprint_distinguishes_mode_and_flexible() {
        let a = atoms();
        let f1 = fingerprint(Mode::Default, 2, false, &a);
        let f2 = fingerprint(Mode::Intensive, 2, false, &a);
        let f3 = fingerprint(Mode::Default, 2, true, &a);
        assert_ne!(f1, f2);
        assert_ne!(f1, f3);
    }

    #[test]
    fn cache_roundtrips() {
        let cache = Cache::new();
        let key = fingerprint(Mode::Default, 2, false, &atoms());
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), AnalysisResult::with_error("test".to_string(), 0, 2, "placeholder"));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.len(), 1);
    }
}
