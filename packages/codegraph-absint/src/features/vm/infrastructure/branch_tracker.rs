//! Case coverage of `match` statements

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::typegraph::{CfgNodeId, ValueId};

/// Whether a class pattern adds coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseCoverage {
    New,
    /// An earlier case of the same statement already matched this class
    Redundant,
}

/// One statement executed by one frame: (statement index, frame start node)
type StatementKey = (usize, CfgNodeId);

/// Classes matched so far by each running `match` statement.
///
/// Keyed by frame as well, so that analyzing the same function twice
/// starts from scratch.
#[derive(Debug, Default)]
pub struct BranchTracker {
    covered: FxHashMap<StatementKey, Vec<ValueId>>,
    finished: FxHashSet<StatementKey>,
}

impl BranchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cover(&mut self, statement: usize, frame: CfgNodeId, class: ValueId) -> CaseCoverage {
        let classes = self.covered.entry((statement, frame)).or_default();
        if classes.contains(&class) {
            return CaseCoverage::Redundant;
        }
        classes.push(class);
        CaseCoverage::New
    }

    pub fn covered(&self, statement: usize, frame: CfgNodeId) -> &[ValueId] {
        self.covered
            .get(&(statement, frame))
            .map_or(&[], Vec::as_slice)
    }

    /// Mark the statement as checked; true only the first time
    pub fn finish(&mut self, statement: usize, frame: CfgNodeId) -> bool {
        self.finished.insert((statement, frame))
    }
}
