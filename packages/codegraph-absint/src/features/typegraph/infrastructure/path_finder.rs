//! Backward path search over the CFG
//!
//! Paths are searched from a query position towards an origin node, following
//! incoming edges. A node in `blocked` is never expanded (the start node
//! included), but reaching `finish` always succeeds.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::typegraph::domain::{CfgNodeId, Program};

pub struct PathFinder<'p> {
    program: &'p Program,
}

impl<'p> PathFinder<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self { program }
    }

    /// Is there any path `finish -> ... -> start` avoiding `blocked`?
    pub fn find_any_path(
        &self,
        start: CfgNodeId,
        finish: CfgNodeId,
        blocked: &FxHashSet<CfgNodeId>,
    ) -> bool {
        let mut stack = vec![start];
        let mut seen = FxHashSet::default();
        while let Some(node) = stack.pop() {
            if node == finish {
                return true;
            }
            if blocked.contains(&node) || !seen.insert(node) {
                continue;
            }
            stack.extend(self.program.predecessors(node));
        }
        false
    }

    /// Shortest backward path, `start` first and `finish` last
    pub fn find_shortest_path(
        &self,
        start: CfgNodeId,
        finish: CfgNodeId,
        blocked: &FxHashSet<CfgNodeId>,
    ) -> Option<Vec<CfgNodeId>> {
        let mut queue = VecDeque::from([start]);
        let mut parent: FxHashMap<CfgNodeId, CfgNodeId> = FxHashMap::default();
        let mut seen = FxHashSet::default();
        seen.insert(start);
        while let Some(node) = queue.pop_front() {
            if node == finish {
                let mut path = vec![node];
                let mut cur = node;
                while let Some(&p) = parent.get(&cur) {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            if blocked.contains(&node) {
                continue;
            }
            for pred in self.program.predecessors(node) {
                if seen.insert(pred) {
                    parent.insert(pred, node);
                    queue.push_back(pred);
                }
            }
        }
        None
    }

    /// Does every backward path from `start` to `finish` pass through `node`?
    pub fn is_on_all_paths(
        &self,
        start: CfgNodeId,
        finish: CfgNodeId,
        node: CfgNodeId,
        blocked: &FxHashSet<CfgNodeId>,
    ) -> bool {
        if node == finish {
            return true;
        }
        let mut with_node = blocked.clone();
        with_node.insert(node);
        !self.find_any_path(start, finish, &with_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Program, [CfgNodeId; 4]) {
        let mut p = Program::new();
        let n0 = p.new_cfg_node("n0", None);
        let n1 = p.connect_new(n0, "n1", None);
        let n2 = p.connect_new(n0, "n2", None);
        let n3 = p.connect_new(n1, "n3", None);
        p.connect_to(n2, n3);
        (p, [n0, n1, n2, n3])
    }

    #[test]
    fn test_shortest_path_runs_backwards() {
        let (p, [n0, n1, _, n3]) = diamond();
        let finder = PathFinder::new(&p);
        let path = finder.find_shortest_path(n3, n0, &FxHashSet::default());
        assert_eq!(path, Some(vec![n3, n1, n0]));
    }

    #[test]
    fn test_blocked_nodes_are_not_crossed() {
        let (p, [n0, n1, n2, n3]) = diamond();
        let finder = PathFinder::new(&p);
        let blocked: FxHashSet<_> = [n1].into_iter().collect();
        assert_eq!(
            finder.find_shortest_path(n3, n0, &blocked),
            Some(vec![n3, n2, n0])
        );
        let both: FxHashSet<_> = [n1, n2].into_iter().collect();
        assert!(!finder.find_any_path(n3, n0, &both));
        // reaching a blocked finish still counts
        assert!(finder.find_any_path(n3, n1, &blocked));
    }

    #[test]
    fn test_blocked_start_is_not_expanded() {
        let (p, [n0, _, _, n3]) = diamond();
        let finder = PathFinder::new(&p);
        let blocked: FxHashSet<_> = [n3].into_iter().collect();
        assert!(!finder.find_any_path(n3, n0, &blocked));
        assert!(finder.find_any_path(n3, n3, &blocked));
    }

    #[test]
    fn test_on_all_paths() {
        let (p, [n0, n1, _, n3]) = diamond();
        let finder = PathFinder::new(&p);
        let none = FxHashSet::default();
        assert!(!finder.is_on_all_paths(n3, n0, n1, &none));
        assert!(finder.is_on_all_paths(n3, n0, n0, &none));
        assert!(finder.is_on_all_paths(n1, n0, n0, &none));
    }
}
