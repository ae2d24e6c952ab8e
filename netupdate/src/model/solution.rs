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

//! Typed solver results: the raw solver status, the per-solve temporal log, the full
//! [`NetworkUpdateSolution`], and the reduced [`ExtractedSolution`] used for reporting.

use crate::instance::Node;
use crate::Error;

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

/// An update schedule: for every round (starting at 1), the set of nodes upgraded in that round.
/// Rounds without any upgrade are omitted.
pub type Schedule = BTreeMap<usize, Vec<Node>>;

/// Raw termination status of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// The solver proved optimality of the incumbent.
    Optimal,
    /// The solver proved that the model is infeasible.
    Infeasible,
    /// The solver proved that the model is unbounded.
    Unbounded,
    /// The solver stopped due to a limit (e.g., the time limit) without a proof.
    Stopped,
    /// The solver terminated for an unrecognized reason.
    Unknown,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => write!(f, "optimal"),
            Self::Infeasible => write!(f, "infeasible"),
            Self::Unbounded => write!(f, "unbounded"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Solver status of a finished solve, as reported by the solver itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverStatus {
    /// Termination status.
    pub code: StatusCode,
    /// Number of feasible solutions found during the search.
    pub solution_count: usize,
    /// Objective value of the incumbent, if one exists.
    pub objective: Option<f64>,
    /// Best proven bound on the objective, if the solver reported one.
    pub best_bound: Option<f64>,
    /// Relative gap between incumbent and bound, if both exist.
    pub mip_gap: Option<f64>,
    /// Number of branch-and-bound nodes explored, if the solver reported it.
    pub node_count: usize,
}

impl SolverStatus {
    /// At least one feasible solution was found.
    pub fn is_feasible(&self) -> bool {
        self.solution_count > 0
    }

    /// The incumbent was proven optimal.
    pub fn is_optimal(&self) -> bool {
        self.code == StatusCode::Optimal && self.solution_count > 0
    }

    /// The model was proven to have no solution. An unbounded model counts as infeasible here,
    /// since the objective is bounded by the round horizon for every well-formed model.
    pub fn is_infeasible(&self) -> bool {
        matches!(self.code, StatusCode::Infeasible | StatusCode::Unbounded)
    }

    /// Neither a feasible solution nor an infeasibility proof was obtained.
    pub fn is_unknown(&self) -> bool {
        !self.is_feasible() && !self.is_infeasible()
    }
}

/// One sample of the temporal log: the state of the search at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the solve started.
    pub seconds: f64,
    /// Branch-and-bound nodes explored so far.
    pub node_count: usize,
    /// Objective value of the incumbent, if one exists at that time.
    pub objective: Option<f64>,
    /// Best proven bound at that time, if any.
    pub bound: Option<f64>,
    /// Number of feasible solutions found so far.
    pub solution_count: usize,
}

/// # Temporal Log
///
/// Chronological trace of the search progress during one solve, filled by an append-only event
/// sink. Samples arriving within the same whole second that carry an unchanged objective only
/// update the last entry in place instead of appending, which keeps the log proportional to
/// actual progress rather than to the event rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalLog {
    entries: Vec<LogEntry>,
}

impl TemporalLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the search state observed `seconds` after the solve started.
    pub fn add_sample(
        &mut self,
        seconds: f64,
        node_count: usize,
        objective: Option<f64>,
        bound: Option<f64>,
        solution_count: usize,
    ) {
        let entry = LogEntry { seconds, node_count, objective, bound, solution_count };
        if let Some(last) = self.entries.last_mut() {
            if last.seconds.floor() == seconds.floor() && last.objective == objective {
                *last = entry;
                return;
            }
        }
        self.entries.push(entry);
    }

    /// All recorded entries, in chronological order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The first entry at which an incumbent existed, if any.
    pub fn first_incumbent(&self) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.solution_count > 0)
    }

    /// Returns `true` if no sample was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// # Network Update Solution
///
/// The complete outcome of solving one model: the solver status, the extracted schedule (if a
/// feasible solution exists), the temporal log, and both time measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkUpdateSolution {
    /// Solver status at termination.
    pub status: SolverStatus,
    /// The extracted schedule. `None` exactly if no feasible solution was found.
    pub schedule: Option<Schedule>,
    /// Temporal trace of the incumbent objective.
    pub temporal_log: TemporalLog,
    /// Time spent inside the solver, in seconds.
    pub solver_time: f64,
    /// Wall-clock time of the entire solve including model construction and extraction, in
    /// seconds.
    pub wall_time: f64,
}

impl NetworkUpdateSolution {
    /// The extracted schedule.
    ///
    /// Fails with [`Error::IllegalState`] if no feasible solution exists. Check
    /// [`SolverStatus::is_feasible`] first when infeasibility is an expected outcome.
    pub fn schedule(&self) -> Result<&Schedule, Error> {
        self.schedule.as_ref().ok_or_else(|| {
            Error::IllegalState(format!(
                "no schedule available (solver status: {})",
                self.status.code
            ))
        })
    }

    /// Number of rounds actually used by the schedule, i.e., the largest round with at least one
    /// upgraded node. `None` if no feasible solution exists.
    pub fn number_of_rounds(&self) -> Option<usize> {
        self.schedule
            .as_ref()
            .map(|s| s.keys().next_back().copied().unwrap_or(0))
    }
}

/// Classification of a solve outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionClass {
    /// A schedule was found and proven to use the minimum number of rounds.
    Optimal,
    /// A schedule was found, but optimality was not proven.
    Feasible,
    /// No schedule exists for this instance and configuration.
    Infeasible,
    /// The solver stopped without a schedule and without an infeasibility proof.
    Unknown,
}

impl fmt::Display for SolutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => write!(f, "OPTIMAL"),
            Self::Feasible => write!(f, "FEASIBLE"),
            Self::Infeasible => write!(f, "INFEASIBLE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// # Extracted Solution
///
/// Reduced, report-friendly view of a [`NetworkUpdateSolution`]: the classification and the key
/// numbers, without the full schedule or log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSolution {
    /// Outcome classification.
    pub class: SolutionClass,
    /// Number of rounds of the schedule, if one exists.
    pub number_of_rounds: Option<usize>,
    /// Incumbent objective value, if one exists.
    pub objective: Option<f64>,
    /// Best proven bound, if reported.
    pub best_bound: Option<f64>,
    /// Relative optimality gap, if reported.
    pub mip_gap: Option<f64>,
    /// Objective value of the first logged incumbent, if any.
    pub first_incumbent_objective: Option<f64>,
    /// Time until the first incumbent was found, in seconds, if any incumbent was logged.
    pub first_incumbent_time: Option<f64>,
    /// Time spent inside the solver, in seconds.
    pub solver_time: f64,
    /// Wall-clock time of the solve, in seconds.
    pub wall_time: f64,
}

impl ExtractedSolution {
    /// Classify and reduce a full solution.
    pub fn from_solution(solution: &NetworkUpdateSolution) -> Self {
        let class = if solution.status.is_optimal() {
            SolutionClass::Optimal
        } else if solution.status.is_feasible() {
            SolutionClass::Feasible
        } else if solution.status.is_infeasible() {
            SolutionClass::Infeasible
        } else {
            SolutionClass::Unknown
        };
        Self {
            class,
            number_of_rounds: solution.number_of_rounds(),
            objective: solution.status.objective,
            best_bound: solution.status.best_bound,
            mip_gap: solution.status.mip_gap,
            first_incumbent_objective: solution
                .temporal_log
                .first_incumbent()
                .and_then(|e| e.objective),
            first_incumbent_time: solution.temporal_log.first_incumbent().map(|e| e.seconds),
            solver_time: solution.solver_time,
            wall_time: solution.wall_time,
        }
    }
}
