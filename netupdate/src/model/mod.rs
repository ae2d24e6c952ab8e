// Netupdate: Computing Loop-Free Network Update Schedules
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Mixed-Integer Program
//!
//! This module encodes a [`NetworkUpdateInstance`] as a Mixed-Integer Program and solves it with
//! CBC (via `good_lp`). The encoding follows the round-based scheduling formulation: binary
//! upgrade variables choose the round of every node, edge existence variables are linearly
//! determined by the cumulative upgrades, and transient edge variables over-approximate the
//! union of two consecutive forwarding states. Loop freedom is enforced with
//! Miller-Tucker-Zemlin node levels over the transient edges, and waypoint enforcement with
//! per-waypoint reachability systems from which all edges touching the waypoint are removed.
//!
//! The [`ModelConfiguration`] selects between the decision variant and the optimization variant,
//! between strong and relaxed loop freedom, and whether the flow extension is added. All eight
//! combinations share the same variable layout and differ only in the constraint families.

use crate::instance::{Edge, NetworkUpdateInstance, Node};
use crate::Error;

use good_lp::{
    constraint,
    solvers::coin_cbc::{coin_cbc, CoinCbcProblem},
    variable, Expression, ProblemVariables, SolverModel, Variable, VariableDefinition,
};
use log::*;
use serde::{Deserialize, Serialize};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

mod solution;
pub use solution::{
    ExtractedSolution, LogEntry, NetworkUpdateSolution, Schedule, SolutionClass, SolverStatus,
    StatusCode, TemporalLog,
};

/// Which variant of the Mixed-Integer Program is built.
///
/// - `decision_variant`: instead of minimizing the number of used rounds, force exactly one
///   upgrade per round and only ask for feasibility.
/// - `strong_loop_freedom`: require the union of two consecutive forwarding states to be
///   loop-free everywhere. If `false`, relaxed loop freedom only considers edges whose tail is
///   reachable from the start node.
/// - `use_flow_extension`: add a unit flow from start to end in every forwarding state. This
///   does not change the set of feasible schedules, but strengthens the linear relaxation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ModelConfiguration {
    /// Only decide feasibility with exactly one upgrade per round.
    pub decision_variant: bool,
    /// Enforce loop freedom on all transient edges, reachable or not.
    pub strong_loop_freedom: bool,
    /// Add the strengthening flow formulation.
    pub use_flow_extension: bool,
}

impl fmt::Display for ModelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decision: {}, strong loop freedom: {}, flow extension: {}",
            self.decision_variant, self.strong_loop_freedom, self.use_flow_extension
        )
    }
}

impl ModelConfiguration {
    /// All eight configurations, in a deterministic order.
    pub fn all() -> Vec<Self> {
        let mut result = Vec::with_capacity(8);
        for decision_variant in &[false, true] {
            for strong_loop_freedom in &[false, true] {
                for use_flow_extension in &[false, true] {
                    result.push(Self {
                        decision_variant: *decision_variant,
                        strong_loop_freedom: *strong_loop_freedom,
                        use_flow_extension: *use_flow_extension,
                    });
                }
            }
        }
        result
    }
}

/// Resource limits and tolerances passed through to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Time limit in seconds.
    pub time_limit: f64,
    /// Number of solver threads.
    pub threads: usize,
    /// Relative optimality gap at which the search stops. Ignored for the decision variant,
    /// which always uses a gap of 1.0 to stop at the first feasible solution.
    pub mip_gap: f64,
    /// Stop the search after this many incumbents, reporting the best one found so far. `None`
    /// disables the limit.
    #[serde(default)]
    pub solution_limit: Option<usize>,
    /// Numerical stability emphasis, 0 (default) to 3. Accepted for compatibility; CBC exposes
    /// no equivalent knob, so the value is validated but not forwarded.
    pub numeric_focus: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self { time_limit: 600.0, threads: 1, mip_gap: 0.01, solution_limit: None, numeric_focus: 0 }
    }
}

impl SolverSettings {
    /// Default settings, but with one solver thread per available core.
    pub fn parallel() -> Self {
        Self { threads: num_cpus::get(), ..Default::default() }
    }

    /// Check that all settings are within their allowed ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.time_limit > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "time limit must be positive (got {})",
                self.time_limit
            )));
        }
        if self.threads == 0 || self.threads > num_cpus::get() {
            return Err(Error::InvalidParameter(format!(
                "thread count must lie in [1, {}] (got {})",
                num_cpus::get(),
                self.threads
            )));
        }
        if !(0.0..=1.0).contains(&self.mip_gap) {
            return Err(Error::InvalidParameter(format!(
                "MIP gap must lie in [0, 1] (got {})",
                self.mip_gap
            )));
        }
        if self.solution_limit == Some(0) {
            return Err(Error::InvalidParameter(
                "solution limit must be at least 1".to_string(),
            ));
        }
        if self.numeric_focus > 3 {
            return Err(Error::InvalidParameter(format!(
                "numeric focus must lie in 0..=3 (got {})",
                self.numeric_focus
            )));
        }
        Ok(())
    }
}

/// All decision variables of one built model, grouped by family. Vectors over rounds are indexed
/// by `r - 1` for families over rounds `1..=R`, and by `r` for families over super-rounds
/// `0..=R`.
struct ModelVariables {
    /// `upgrade[v][r-1]`: node `v` is upgraded in round `r` (binary).
    upgrade: HashMap<Node, Vec<Variable>>,
    /// `edge_exists[e][r]`: edge `e` exists in super-round `r`.
    edge_exists: HashMap<Edge, Vec<Variable>>,
    /// `transient[e][r-1]`: edge `e` may carry traffic during the transition of round `r`.
    transient: HashMap<Edge, Vec<Variable>>,
    /// `reachable[v][r-1]`: node `v` is reachable from start during the transition of round `r`.
    /// Only present for relaxed loop freedom.
    reachable: Option<HashMap<Node, Vec<Variable>>>,
    /// `reachable_without[wp][v][r-1]`: node `v` is reachable from start while avoiding all
    /// edges incident to waypoint `wp`, during the transition of round `r`.
    reachable_without: HashMap<Node, HashMap<Node, Vec<Variable>>>,
    /// `flow[e][r]`: flow on edge `e` in super-round `r`. Only present with the flow extension.
    flow: Option<HashMap<Edge, Vec<Variable>>>,
    /// `level[v][r-1]`: topological level of node `v` during the transition of round `r`.
    level: HashMap<Node, Vec<Variable>>,
    /// `upgrade_in_round[r-1]`: at least one node is upgraded in round `r`.
    upgrade_in_round: Vec<Variable>,
    /// Objective variable, an upper bound on `r * upgrade_in_round[r]` for all rounds.
    number_of_used_rounds: Variable,
    /// Position of every variable in the solver's column layout (creation order).
    column: HashMap<Variable, usize>,
}

/// Registers variables in creation order. The solver keeps one column per variable in exactly
/// that order, which is what allows reading raw column values back after a solve.
struct ColumnRecorder<'p> {
    problem: &'p mut ProblemVariables,
    column: HashMap<Variable, usize>,
}

impl ColumnRecorder<'_> {
    fn add(&mut self, definition: VariableDefinition) -> Variable {
        let v = self.problem.add(definition);
        self.column.insert(v, self.column.len());
        v
    }
}

/// Read access to the raw column values of a solved model, keyed by the variables handed out
/// during construction.
struct ColumnValues<'a> {
    column: &'a HashMap<Variable, usize>,
    values: &'a [f64],
}

impl ColumnValues<'_> {
    fn value(&self, variable: Variable) -> f64 {
        self.values[self.column[&variable]]
    }
}

/// # Model Builder
///
/// Builds and solves the Mixed-Integer Program for one instance under one configuration. The
/// builder borrows the instance, precomputes the index sets, and produces a fresh model on every
/// [`solve`](ModelBuilder::solve) call, so that a single builder can be reused with different
/// solver settings.
pub struct ModelBuilder<'a> {
    instance: &'a NetworkUpdateInstance,
    configuration: ModelConfiguration,
    /// All nodes except the end node: the candidates for upgrades.
    upgradable_nodes: Vec<Node>,
    /// Old and new edges combined, each edge once.
    all_edges: Vec<Edge>,
    /// Edges belonging to both paths. Their existence is independent of any upgrade.
    shared_edges: HashSet<Edge>,
    outgoing_edges: HashMap<Node, Vec<Edge>>,
    incoming_edges: HashMap<Node, Vec<Edge>>,
    /// The round horizon R.
    rounds: usize,
}

impl<'a> ModelBuilder<'a> {
    /// Prepare a builder for the given instance and configuration.
    ///
    /// The instance is validated first; an instance violating its structural invariants is
    /// rejected here rather than producing a nonsensical model.
    pub fn new(
        instance: &'a NetworkUpdateInstance,
        configuration: ModelConfiguration,
    ) -> Result<Self, Error> {
        instance.validate()?;

        // the generator never produces an edge belonging to both paths, but hand-built
        // instances may share one (a node whose old and new next-hop coincide). Such an edge
        // has a single variable and exists in every forwarding state.
        let old: HashSet<Edge> = instance.old_edges.iter().copied().collect();
        let shared_edges: HashSet<Edge> =
            instance.new_edges.iter().copied().filter(|e| old.contains(e)).collect();

        let mut all_edges: Vec<Edge> =
            Vec::with_capacity(instance.old_edges.len() + instance.new_edges.len());
        all_edges.extend(instance.old_edges.iter().copied());
        all_edges
            .extend(instance.new_edges.iter().copied().filter(|e| !shared_edges.contains(e)));

        let mut outgoing_edges: HashMap<Node, Vec<Edge>> =
            instance.nodes.iter().map(|v| (*v, Vec::new())).collect();
        let mut incoming_edges: HashMap<Node, Vec<Edge>> =
            instance.nodes.iter().map(|v| (*v, Vec::new())).collect();
        for (tail, head) in all_edges.iter() {
            outgoing_edges.get_mut(tail).unwrap().push((*tail, *head));
            incoming_edges.get_mut(head).unwrap().push((*tail, *head));
        }

        let upgradable_nodes: Vec<Node> =
            instance.nodes.iter().copied().filter(|v| *v != instance.end).collect();

        Ok(Self {
            instance,
            configuration,
            upgradable_nodes,
            all_edges,
            shared_edges,
            outgoing_edges,
            incoming_edges,
            rounds: instance.rounds,
        })
    }

    /// Build the model, solve it, and interpret the outcome.
    ///
    /// Infeasibility of the model is a regular outcome (see
    /// [`SolverStatus::is_infeasible`]), not an error. Errors are reserved for invalid settings.
    pub fn solve(&self, settings: &SolverSettings) -> Result<NetworkUpdateSolution, Error> {
        settings.validate()?;

        let wall_start = Instant::now();

        let mut problem_vars = ProblemVariables::new();
        let vars = self.construct_variables(&mut problem_vars);

        let mut problem =
            coin_cbc(problem_vars.minimise(Expression::from(vars.number_of_used_rounds)));

        problem.set_parameter("seconds", &format!("{}", settings.time_limit));
        problem.set_parameter("threads", &format!("{}", settings.threads));
        // the decision variant stops at the first feasible solution.
        let gap = if self.configuration.decision_variant { 1.0 } else { settings.mip_gap };
        problem.set_parameter("ratioGap", &format!("{}", gap));
        if let Some(limit) = settings.solution_limit {
            problem.set_parameter("maxSolutions", &format!("{}", limit));
        }
        problem.set_parameter("logLevel", "0");

        self.construct_constraints(&mut problem, &vars);

        debug!(
            "solving model with {} nodes, {} rounds ({})",
            self.instance.nodes.len(),
            self.rounds,
            self.configuration
        );

        // solve on the raw model: the good_lp wrapper reports a limit stop as a bare error and
        // discards the incumbent that CBC keeps in its column buffer.
        let solver_start = Instant::now();
        let raw_solution = problem.as_inner_mut().solve();
        let solver_time = solver_start.elapsed().as_secs_f64();

        let raw = raw_solution.raw();
        let values = ColumnValues { column: &vars.column, values: raw.col_solution() };

        let mut temporal_log = TemporalLog::new();
        let (status, schedule) = if raw.is_proven_infeasible() {
            let status = SolverStatus {
                code: StatusCode::Infeasible,
                solution_count: 0,
                objective: None,
                best_bound: None,
                mip_gap: None,
                node_count: 0,
            };
            (status, None)
        } else if raw.is_proven_optimal() {
            let objective = values.value(vars.number_of_used_rounds);
            temporal_log.add_sample(solver_time, 0, Some(objective), None, 1);
            let status = SolverStatus {
                code: StatusCode::Optimal,
                solution_count: 1,
                objective: Some(objective),
                best_bound: None,
                mip_gap: None,
                node_count: 0,
            };
            let schedule = self.extract_schedule(&values, &vars);
            (status, Some(schedule))
        } else if self.has_incumbent(&values, &vars) {
            // stopped on a limit (time or solution count) with an incumbent
            let objective = values.value(vars.number_of_used_rounds);
            temporal_log.add_sample(solver_time, 0, Some(objective), None, 1);
            let status = SolverStatus {
                code: StatusCode::Stopped,
                solution_count: 1,
                objective: Some(objective),
                best_bound: None,
                mip_gap: None,
                node_count: 0,
            };
            let schedule = self.extract_schedule(&values, &vars);
            (status, Some(schedule))
        } else {
            warn!("solver stopped without an incumbent ({:?})", raw.status());
            let status = SolverStatus {
                code: StatusCode::Stopped,
                solution_count: 0,
                objective: None,
                best_bound: None,
                mip_gap: None,
                node_count: 0,
            };
            (status, None)
        };

        Ok(NetworkUpdateSolution {
            status,
            schedule,
            temporal_log,
            solver_time,
            wall_time: wall_start.elapsed().as_secs_f64(),
        })
    }

    /// Whether the column values of a stopped solve encode a true incumbent. CBC leaves the
    /// best solution in the column buffer when one exists and the last relaxation otherwise;
    /// only a true incumbent assigns every upgradable node integrally to exactly one round.
    fn has_incumbent(&self, values: &ColumnValues<'_>, vars: &ModelVariables) -> bool {
        if values.values.len() < values.column.len() {
            return false;
        }
        self.upgradable_nodes.iter().all(|v| {
            let mut total = 0.0;
            for u in vars.upgrade[v].iter() {
                let x = values.value(*u);
                if (x - x.round()).abs() > 1e-6 {
                    return false;
                }
                total += x;
            }
            (total - 1.0).abs() < 1e-6
        })
    }

    /// Read the upgrade variables back into a round-indexed schedule. Rounds without any
    /// upgraded node are omitted.
    fn extract_schedule(&self, values: &ColumnValues<'_>, vars: &ModelVariables) -> Schedule {
        let mut schedule = Schedule::new();
        for r in 1..=self.rounds {
            let mut upgraded: Vec<Node> = self
                .upgradable_nodes
                .iter()
                .copied()
                .filter(|v| values.value(vars.upgrade[v][r - 1]) > 0.5)
                .collect();
            if !upgraded.is_empty() {
                upgraded.sort_unstable();
                schedule.insert(r, upgraded);
            }
        }
        schedule
    }

    fn construct_variables(&self, problem: &mut ProblemVariables) -> ModelVariables {
        let mut p = ColumnRecorder { problem, column: HashMap::new() };
        let r_count = self.rounds;
        let n = self.instance.nodes.len();

        let upgrade = self
            .upgradable_nodes
            .iter()
            .map(|v| (*v, (0..r_count).map(|_| p.add(variable().binary())).collect()))
            .collect();

        let edge_exists = self
            .all_edges
            .iter()
            .map(|e| {
                (*e, (0..=r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect())
            })
            .collect();

        let transient = self
            .all_edges
            .iter()
            .map(|e| (*e, (0..r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect()))
            .collect();

        let reachable = if self.configuration.strong_loop_freedom {
            None
        } else {
            Some(
                self.instance
                    .nodes
                    .iter()
                    .map(|v| {
                        (*v, (0..r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect())
                    })
                    .collect(),
            )
        };

        let reachable_without = self
            .instance
            .waypoints
            .iter()
            .map(|wp| {
                let per_node = self
                    .instance
                    .nodes
                    .iter()
                    .map(|v| {
                        (*v, (0..r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect())
                    })
                    .collect();
                (*wp, per_node)
            })
            .collect();

        let flow = if self.configuration.use_flow_extension {
            Some(
                self.all_edges
                    .iter()
                    .map(|e| {
                        (*e, (0..=r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect())
                    })
                    .collect(),
            )
        } else {
            None
        };

        let level = self
            .instance
            .nodes
            .iter()
            .map(|v| {
                (
                    *v,
                    (0..r_count)
                        .map(|_| p.add(variable().min(0.0).max((n - 1) as f64)))
                        .collect(),
                )
            })
            .collect();

        let upgrade_in_round =
            (0..r_count).map(|_| p.add(variable().min(0.0).max(1.0))).collect();

        let number_of_used_rounds = p.add(variable().min(0.0).max(r_count as f64));

        ModelVariables {
            upgrade,
            edge_exists,
            transient,
            reachable,
            reachable_without,
            flow,
            level,
            upgrade_in_round,
            number_of_used_rounds,
            column: p.column,
        }
    }

    fn construct_constraints(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        self.constrain_upgrades(problem, vars);
        self.constrain_edge_existence(problem, vars);
        if !self.configuration.strong_loop_freedom {
            self.constrain_reachability(problem, vars);
        }
        self.constrain_waypoints(problem, vars);
        self.constrain_loop_freedom(problem, vars);
        if self.configuration.use_flow_extension {
            self.constrain_flow(problem, vars);
        }
        self.constrain_objective(problem, vars);
    }

    /// Every upgradable node is upgraded in exactly one round. The decision variant additionally
    /// forces exactly one upgrade per round, turning the horizon into a permutation of nodes.
    fn constrain_upgrades(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        for v in self.upgradable_nodes.iter() {
            let total = vars.upgrade[v]
                .iter()
                .fold(Expression::from(0), |acc, u| acc + *u);
            problem.add_constraint(constraint!(total == 1.0));
        }

        if self.configuration.decision_variant {
            for r in 1..=self.rounds {
                let total = self
                    .upgradable_nodes
                    .iter()
                    .fold(Expression::from(0), |acc, v| acc + vars.upgrade[v][r - 1]);
                problem.add_constraint(constraint!(total == 1.0));
            }
        }
    }

    /// Edge existence is a linear function of the cumulative upgrades of the edge's tail: old
    /// edges disappear when the tail is upgraded, new edges appear.
    fn constrain_edge_existence(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        for r in 0..=self.rounds {
            for e in self.instance.old_edges.iter() {
                let exists = vars.edge_exists[e][r];
                if self.shared_edges.contains(e) {
                    problem.add_constraint(constraint!(Expression::from(exists) == 1.0));
                    continue;
                }
                let upgraded = self.cumulative_upgrades(vars, e.0, r);
                problem.add_constraint(constraint!(upgraded + exists == 1.0));
            }
            for e in self.instance.new_edges.iter() {
                if self.shared_edges.contains(e) {
                    continue;
                }
                let upgraded = self.cumulative_upgrades(vars, e.0, r);
                let exists = vars.edge_exists[e][r];
                problem.add_constraint(constraint!(Expression::from(exists) - upgraded == 0.0));
            }
        }
    }

    /// Sum of all upgrades of `v` up to and including round `r`.
    fn cumulative_upgrades(&self, vars: &ModelVariables, v: Node, r: usize) -> Expression {
        vars.upgrade[&v][..r]
            .iter()
            .fold(Expression::from(0), |acc, u| acc + *u)
    }

    /// Relaxed loop freedom only: a node is marked reachable whenever an existing edge (in
    /// either the pre- or the post-round state) connects it to a reachable node. Both states are
    /// constrained separately so that the marking covers the entire transition.
    fn constrain_reachability(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        let reachable = vars.reachable.as_ref().unwrap();
        for r in 1..=self.rounds {
            problem.add_constraint(constraint!(
                Expression::from(reachable[&self.instance.start][r - 1]) == 1.0
            ));
            for (tail, head) in self.all_edges.iter() {
                let head_var = reachable[head][r - 1];
                let tail_var = reachable[tail][r - 1];
                let post = vars.edge_exists[&(*tail, *head)][r];
                let pre = vars.edge_exists[&(*tail, *head)][r - 1];
                problem.add_constraint(constraint!(head_var - tail_var - post >= -1.0));
                problem.add_constraint(constraint!(head_var - tail_var - pre >= -1.0));
            }
        }
    }

    /// Waypoint enforcement: in a copy of the reachability system from which all edges incident
    /// to the waypoint are removed, the end node must be unreachable. A packet can then never
    /// travel from start to end while bypassing the waypoint, in any forwarding state touched by
    /// a transition.
    fn constrain_waypoints(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        for wp in self.instance.waypoints.iter() {
            let reachable = &vars.reachable_without[wp];
            for r in 1..=self.rounds {
                problem.add_constraint(constraint!(
                    Expression::from(reachable[&self.instance.start][r - 1]) == 1.0
                ));
                for (tail, head) in self.all_edges.iter() {
                    if tail == wp || head == wp {
                        continue;
                    }
                    let head_var = reachable[head][r - 1];
                    let tail_var = reachable[tail][r - 1];
                    let post = vars.edge_exists[&(*tail, *head)][r];
                    let pre = vars.edge_exists[&(*tail, *head)][r - 1];
                    problem.add_constraint(constraint!(head_var - tail_var - post >= -1.0));
                    problem.add_constraint(constraint!(head_var - tail_var - pre >= -1.0));
                }
                problem.add_constraint(constraint!(
                    Expression::from(reachable[&self.instance.end][r - 1]) == 0.0
                ));
            }
        }
    }

    /// Loop freedom via Miller-Tucker-Zemlin levels: the transient edges of every transition
    /// contain both the pre- and post-round state (restricted to reachable tails under relaxed
    /// loop freedom), and every transient edge must climb the level ordering.
    fn constrain_loop_freedom(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        let n = self.instance.nodes.len() as f64;
        for r in 1..=self.rounds {
            for (tail, head) in self.all_edges.iter() {
                let transient = vars.transient[&(*tail, *head)][r - 1];
                let pre = vars.edge_exists[&(*tail, *head)][r - 1];
                let post = vars.edge_exists[&(*tail, *head)][r];
                if self.configuration.strong_loop_freedom {
                    problem.add_constraint(constraint!(transient - pre >= 0.0));
                    problem.add_constraint(constraint!(transient - post >= 0.0));
                } else {
                    let tail_reachable = vars.reachable.as_ref().unwrap()[tail][r - 1];
                    problem.add_constraint(constraint!(transient - pre - tail_reachable >= -1.0));
                    problem
                        .add_constraint(constraint!(transient - post - tail_reachable >= -1.0));
                }
            }

            for (tail, head) in self.all_edges.iter() {
                let transient = vars.transient[&(*tail, *head)][r - 1];
                let tail_level = vars.level[tail][r - 1];
                let head_level = vars.level[head][r - 1];
                problem.add_constraint(constraint!(
                    (n - 1.0) * transient + tail_level - head_level <= n - 2.0
                ));
            }

            problem.add_constraint(constraint!(
                Expression::from(vars.level[&self.instance.start][r - 1]) == 0.0
            ));
        }
    }

    /// Flow extension: a unit of flow leaves the start node, is conserved at interior nodes, is
    /// only carried by existing edges, and must pass every waypoint and arrive at the end node
    /// in every forwarding state.
    fn constrain_flow(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        let flow = vars.flow.as_ref().unwrap();
        let flow_sum = |edges: &[Edge], r: usize| {
            edges.iter().fold(Expression::from(0), |acc, e| acc + flow[e][r])
        };

        for r in 1..=self.rounds {
            let outflow = flow_sum(&self.outgoing_edges[&self.instance.start], r);
            problem.add_constraint(constraint!(outflow == 1.0));
        }

        for r in 0..=self.rounds {
            for v in self.instance.nodes.iter() {
                if *v == self.instance.start || *v == self.instance.end {
                    continue;
                }
                let outflow = flow_sum(&self.outgoing_edges[v], r);
                let inflow = flow_sum(&self.incoming_edges[v], r);
                problem.add_constraint(constraint!(outflow - inflow == 0.0));
            }

            for e in self.all_edges.iter() {
                let f = flow[e][r];
                let exists = vars.edge_exists[e][r];
                problem.add_constraint(constraint!(f - exists <= 0.0));
            }

            for wp in self.instance.waypoints.iter() {
                let inflow = flow_sum(&self.incoming_edges[wp], r);
                problem.add_constraint(constraint!(inflow == 1.0));
            }

            let end_inflow = flow_sum(&self.incoming_edges[&self.instance.end], r);
            problem.add_constraint(constraint!(end_inflow == 1.0));
        }

        if !self.configuration.strong_loop_freedom {
            // flow pushes the reachability marking from below, tightening the relaxation.
            let reachable = vars.reachable.as_ref().unwrap();
            for r in 1..=self.rounds {
                for v in self.upgradable_nodes.iter() {
                    if *v == self.instance.start {
                        continue;
                    }
                    let reach = reachable[v][r - 1];
                    let inflow_post = flow_sum(&self.incoming_edges[v], r);
                    let inflow_pre = flow_sum(&self.incoming_edges[v], r - 1);
                    problem.add_constraint(constraint!(inflow_post - reach <= 0.0));
                    problem.add_constraint(constraint!(inflow_pre - reach <= 0.0));
                }
            }
        }
    }

    /// Objective coupling: `upgrade_in_round[r]` dominates every upgrade of round `r`, and the
    /// objective variable dominates `r * upgrade_in_round[r]`. Minimizing the objective then
    /// yields the largest round in which any node is upgraded.
    fn constrain_objective(&self, problem: &mut CoinCbcProblem, vars: &ModelVariables) {
        for r in 1..=self.rounds {
            let round_used = vars.upgrade_in_round[r - 1];
            for v in self.upgradable_nodes.iter() {
                let upgrade = vars.upgrade[v][r - 1];
                problem.add_constraint(constraint!(round_used - upgrade >= 0.0));
            }
            problem.add_constraint(constraint!(
                Expression::from(vars.number_of_used_rounds) - (r as f64) * round_used >= 0.0
            ));
        }
    }
}
