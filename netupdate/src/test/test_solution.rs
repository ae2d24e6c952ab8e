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

use crate::model::{
    ExtractedSolution, NetworkUpdateSolution, Schedule, SolutionClass, SolverStatus, StatusCode,
    TemporalLog,
};
use crate::Error;

fn status(code: StatusCode, solution_count: usize) -> SolverStatus {
    SolverStatus {
        code,
        solution_count,
        objective: if solution_count > 0 { Some(3.0) } else { None },
        best_bound: None,
        mip_gap: None,
        node_count: 0,
    }
}

fn solution(code: StatusCode, solution_count: usize, schedule: Option<Schedule>) -> NetworkUpdateSolution {
    NetworkUpdateSolution {
        status: status(code, solution_count),
        schedule,
        temporal_log: TemporalLog::new(),
        solver_time: 0.1,
        wall_time: 0.2,
    }
}

#[test]
fn test_log_coalesces_within_one_second() {
    let mut log = TemporalLog::new();
    log.add_sample(0.2, 10, Some(5.0), Some(1.0), 1);
    log.add_sample(0.7, 20, Some(5.0), Some(2.0), 1);
    assert_eq!(log.entries().len(), 1);
    // the coalesced entry carries the newest data
    assert_eq!(log.entries()[0].seconds, 0.7);
    assert_eq!(log.entries()[0].node_count, 20);
    assert_eq!(log.entries()[0].bound, Some(2.0));

    // a changed objective within the same second appends
    log.add_sample(0.9, 25, Some(4.0), Some(2.0), 2);
    assert_eq!(log.entries().len(), 2);

    // an unchanged objective in a later second appends as well
    log.add_sample(1.2, 30, Some(4.0), Some(3.0), 2);
    assert_eq!(log.entries().len(), 3);
}

#[test]
fn test_log_first_incumbent() {
    let mut log = TemporalLog::new();
    assert!(log.first_incumbent().is_none());
    log.add_sample(0.5, 10, None, Some(1.0), 0);
    assert!(log.first_incumbent().is_none());
    log.add_sample(1.5, 50, Some(4.0), Some(1.0), 1);
    log.add_sample(2.5, 80, Some(3.0), Some(2.0), 2);
    let first = log.first_incumbent().unwrap();
    assert_eq!(first.objective, Some(4.0));
    assert_eq!(first.seconds, 1.5);
}

#[test]
fn test_status_predicates() {
    assert!(status(StatusCode::Optimal, 1).is_optimal());
    assert!(status(StatusCode::Optimal, 1).is_feasible());
    assert!(!status(StatusCode::Optimal, 1).is_unknown());

    let stopped_with_incumbent = status(StatusCode::Stopped, 1);
    assert!(stopped_with_incumbent.is_feasible());
    assert!(!stopped_with_incumbent.is_optimal());

    assert!(status(StatusCode::Infeasible, 0).is_infeasible());
    assert!(!status(StatusCode::Infeasible, 0).is_feasible());

    assert!(status(StatusCode::Stopped, 0).is_unknown());
}

#[test]
fn test_schedule_access_requires_feasibility() {
    let infeasible = solution(StatusCode::Infeasible, 0, None);
    match infeasible.schedule() {
        Err(Error::IllegalState(_)) => {}
        r => panic!("expected IllegalState, got {:?}", r),
    }
    assert_eq!(infeasible.number_of_rounds(), None);

    let mut schedule = Schedule::new();
    schedule.insert(1, vec![2, 4]);
    schedule.insert(3, vec![1, 3]);
    let feasible = solution(StatusCode::Optimal, 1, Some(schedule));
    assert!(feasible.schedule().is_ok());
    assert_eq!(feasible.number_of_rounds(), Some(3));
}

#[test]
fn test_classification() {
    let optimal = solution(StatusCode::Optimal, 1, Some(Schedule::new()));
    assert_eq!(ExtractedSolution::from_solution(&optimal).class, SolutionClass::Optimal);

    let feasible = solution(StatusCode::Stopped, 1, Some(Schedule::new()));
    assert_eq!(ExtractedSolution::from_solution(&feasible).class, SolutionClass::Feasible);

    let infeasible = solution(StatusCode::Infeasible, 0, None);
    assert_eq!(ExtractedSolution::from_solution(&infeasible).class, SolutionClass::Infeasible);

    let unknown = solution(StatusCode::Stopped, 0, None);
    assert_eq!(ExtractedSolution::from_solution(&unknown).class, SolutionClass::Unknown);
}

#[test]
fn test_extraction_reads_first_incumbent_from_log() {
    let mut s = solution(StatusCode::Optimal, 1, Some(Schedule::new()));
    s.temporal_log.add_sample(0.5, 10, None, None, 0);
    s.temporal_log.add_sample(2.5, 40, Some(5.0), Some(1.0), 1);
    s.temporal_log.add_sample(4.0, 60, Some(3.0), Some(3.0), 2);
    let extracted = ExtractedSolution::from_solution(&s);
    assert_eq!(extracted.first_incumbent_objective, Some(5.0));
    assert_eq!(extracted.first_incumbent_time, Some(2.5));
}

#[test]
fn test_solution_serde_round_trip() {
    let mut schedule = Schedule::new();
    schedule.insert(1, vec![2]);
    schedule.insert(2, vec![1, 3, 4]);
    let mut s = solution(StatusCode::Optimal, 1, Some(schedule));
    s.temporal_log.add_sample(1.0, 10, Some(2.0), Some(2.0), 1);

    let json = serde_json::to_string(&s).unwrap();
    let back: NetworkUpdateSolution = serde_json::from_str(&json).unwrap();
    assert_eq!(s, back);
}
