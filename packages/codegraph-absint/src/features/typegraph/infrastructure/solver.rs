//! `has_combination` solver
//!
//! A query asks whether a set of bindings ("goals") can hold together at a
//! CFG node. The solver walks backwards from the query position towards the
//! origin of each goal, replacing goals that were created at the node it
//! arrives at with their source sets, until no goals remain.
//!
//! States `(position, goals)` are memoised per query. A state that is still
//! being solved answers `false`, which cuts cycles in the provenance graph.
//! The number of explored states is bounded; hitting the bound answers
//! `true` (the conservative direction for a "may hold" query).

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use super::path_finder::PathFinder;
use crate::features::typegraph::domain::{BindingId, CfgNodeId, Program};

type GoalSet = BTreeSet<BindingId>;

/// Answer of one solver query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverOutcome {
    Satisfiable,
    Unsatisfiable,
    /// Step limit reached before an answer was found
    StepLimit,
}

impl SolverOutcome {
    pub fn is_satisfiable(self) -> bool {
        !matches!(self, SolverOutcome::Unsatisfiable)
    }
}

/// Goals left after consuming finished goals at one position
struct RemoveResult {
    removed: GoalSet,
    remaining: GoalSet,
}

pub struct Solver<'p> {
    program: &'p Program,
    paths: PathFinder<'p>,
    memo: FxHashMap<(CfgNodeId, GoalSet), bool>,
    step_limit: usize,
    steps: usize,
    limit_hit: bool,
}

impl<'p> Solver<'p> {
    pub fn new(program: &'p Program, step_limit: usize) -> Self {
        Self {
            program,
            paths: PathFinder::new(program),
            memo: FxHashMap::default(),
            step_limit,
            steps: 0,
            limit_hit: false,
        }
    }

    /// Can all of `goals` hold simultaneously at `start`?
    pub fn solve(&mut self, start: CfgNodeId, goals: &[BindingId]) -> SolverOutcome {
        let mut set: GoalSet = goals.iter().copied().collect();
        if let Some(condition) = self.program.node(start).condition {
            set.insert(condition);
        }
        let found = self.recall_or_find(start, set);
        if self.limit_hit {
            warn!(
                node = %start,
                limit = self.step_limit,
                "solver step limit reached; assuming the combination holds"
            );
            SolverOutcome::StepLimit
        } else if found {
            SolverOutcome::Satisfiable
        } else {
            SolverOutcome::Unsatisfiable
        }
    }

    pub fn states_explored(&self) -> usize {
        self.steps
    }

    fn recall_or_find(&mut self, pos: CfgNodeId, goals: GoalSet) -> bool {
        let key = (pos, goals);
        if let Some(&known) = self.memo.get(&key) {
            return known;
        }
        self.steps += 1;
        if self.steps > self.step_limit {
            self.limit_hit = true;
            return true;
        }
        // in progress: a cycle back to this state is not a solution
        self.memo.insert(key.clone(), false);
        let found = self.find_solution(key.0, &key.1);
        self.memo.insert(key, found);
        found
    }

    fn find_solution(&mut self, pos: CfgNodeId, goals: &GoalSet) -> bool {
        if goals.is_empty() {
            return true;
        }
        if self.goals_conflict(goals) {
            return false;
        }

        // a path may not cross a node where a goal's variable is rebound
        let mut blocked: FxHashSet<CfgNodeId> = FxHashSet::default();
        let mut origins: Vec<CfgNodeId> = Vec::new();
        for &goal in goals {
            let binding = self.program.binding(goal);
            blocked.extend(self.program.variable(binding.variable).nodes().iter().copied());
            for origin in &binding.origins {
                if !origins.contains(&origin.where_) {
                    origins.push(origin.where_);
                }
            }
        }

        for where_ in origins {
            let Some(path) = self.paths.find_shortest_path(pos, where_, &blocked) else {
                continue;
            };
            let mut target = where_;
            let mut new_goals = goals.clone();
            for &node in path.iter().skip(1) {
                let Some(condition) = self.program.node(node).condition else {
                    continue;
                };
                if self.paths.is_on_all_paths(pos, where_, node, &blocked) {
                    target = node;
                    new_goals.insert(condition);
                    break;
                }
            }
            for result in self.remove_finished_goals(target, &new_goals) {
                let all: GoalSet = result.removed.union(&result.remaining).copied().collect();
                if self.goals_conflict(&all) {
                    continue;
                }
                if self.recall_or_find(target, result.remaining) {
                    return true;
                }
            }
            if self.limit_hit {
                return true;
            }
        }
        false
    }

    /// Two different bindings of one variable can never hold together
    fn goals_conflict(&self, goals: &GoalSet) -> bool {
        let mut seen = FxHashMap::default();
        for &goal in goals {
            let var = self.program.binding(goal).variable;
            if let Some(previous) = seen.insert(var, goal) {
                if previous != goal {
                    return true;
                }
            }
        }
        false
    }

    /// Replace every goal created at `pos` by one of its source sets
    fn remove_finished_goals(&self, pos: CfgNodeId, goals: &GoalSet) -> Vec<RemoveResult> {
        let mut results = Vec::new();
        let mut seen = GoalSet::new();
        let mut removed = GoalSet::new();
        let mut remaining = GoalSet::new();
        self.remove_finished_goals_inner(
            pos,
            goals.clone(),
            &mut seen,
            &mut removed,
            &mut remaining,
            &mut results,
        );
        results
    }

    fn remove_finished_goals_inner(
        &self,
        pos: CfgNodeId,
        mut goals: GoalSet,
        seen: &mut GoalSet,
        removed: &mut GoalSet,
        remaining: &mut GoalSet,
        results: &mut Vec<RemoveResult>,
    ) {
        let Some(goal) = goals.pop_first() else {
            results.push(RemoveResult {
                removed: removed.clone(),
                remaining: remaining.clone(),
            });
            return;
        };
        if seen.contains(&goal) {
            self.remove_finished_goals_inner(pos, goals, seen, removed, remaining, results);
            return;
        }
        seen.insert(goal);
        match self.program.binding(goal).find_origin(pos) {
            None => {
                let inserted = remaining.insert(goal);
                self.remove_finished_goals_inner(pos, goals, seen, removed, remaining, results);
                if inserted {
                    remaining.remove(&goal);
                }
            }
            Some(origin) => {
                let inserted = removed.insert(goal);
                for source_set in &origin.source_sets {
                    let mut next = goals.clone();
                    next.extend(source_set.iter().copied());
                    self.remove_finished_goals_inner(pos, next, seen, removed, remaining, results);
                }
                if inserted {
                    removed.remove(&goal);
                }
            }
        }
        seen.remove(&goal);
    }
}
