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

use crate::instance::{NetworkUpdateInstance, Node};
use crate::model::{
    ExtractedSolution, ModelBuilder, ModelConfiguration, NetworkUpdateSolution, SolutionClass,
    SolverSettings,
};
use crate::Error;

use rand::prelude::*;

use std::collections::HashSet;

/// Old path 1-2-3-4-5, new path 1-3-2-4-5. The final edge (4, 5) is shared by both paths.
fn five_node_instance(waypoints: Vec<Node>) -> NetworkUpdateInstance {
    NetworkUpdateInstance {
        nodes: vec![1, 2, 3, 4, 5],
        old_edges: vec![(1, 2), (2, 3), (3, 4), (4, 5)],
        new_edges: vec![(1, 3), (3, 2), (2, 4), (4, 5)],
        start: 1,
        end: 5,
        waypoints,
        rounds: 4,
    }
}

fn quick_settings() -> SolverSettings {
    SolverSettings { time_limit: 60.0, ..Default::default() }
}

fn solve(
    instance: &NetworkUpdateInstance,
    configuration: ModelConfiguration,
) -> NetworkUpdateSolution {
    ModelBuilder::new(instance, configuration)
        .unwrap()
        .solve(&quick_settings())
        .unwrap()
}

/// Every non-end node appears in exactly one round, and all round indices are within the
/// horizon.
fn assert_schedule_valid(instance: &NetworkUpdateInstance, solution: &NetworkUpdateSolution) {
    let schedule = solution.schedule().unwrap();
    let mut upgraded: HashSet<Node> = HashSet::new();
    for (round, nodes) in schedule.iter() {
        assert!(*round >= 1 && *round <= instance.rounds);
        for v in nodes {
            assert!(*v != instance.end);
            assert!(upgraded.insert(*v), "node {} upgraded twice", v);
        }
    }
    assert_eq!(upgraded.len(), instance.nodes.len() - 1);
}

#[test]
fn test_settings_validation() {
    let bad = SolverSettings { time_limit: 0.0, ..Default::default() };
    assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    let bad = SolverSettings { threads: 0, ..Default::default() };
    assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    let bad = SolverSettings { mip_gap: 1.5, ..Default::default() };
    assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    let bad = SolverSettings { numeric_focus: 4, ..Default::default() };
    assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    let bad = SolverSettings { solution_limit: Some(0), ..Default::default() };
    assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    assert!(SolverSettings::default().validate().is_ok());
}

#[test]
fn test_builder_rejects_invalid_instance() {
    let mut instance = five_node_instance(vec![]);
    instance.end = 4;
    match ModelBuilder::new(&instance, ModelConfiguration::default()) {
        Err(Error::InvariantViolation(_)) => {}
        r => panic!("expected InvariantViolation, got {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_decision_variant_five_nodes() {
    let instance = five_node_instance(vec![]);
    let configuration = ModelConfiguration { decision_variant: true, ..Default::default() };
    let solution = solve(&instance, configuration);
    assert!(solution.status.is_feasible());
    assert_schedule_valid(&instance, &solution);
    // one upgrade per round fills the whole horizon
    assert_eq!(solution.number_of_rounds(), Some(4));
    assert!(solution.schedule().unwrap().values().all(|nodes| nodes.len() == 1));
}

#[test]
fn test_minimize_five_nodes_relaxed() {
    let instance = five_node_instance(vec![]);
    let solution = solve(&instance, ModelConfiguration::default());
    assert!(solution.status.is_optimal());
    assert_schedule_valid(&instance, &solution);
    // node 2 must move away from node 3 strictly before node 3 points back at it, so two
    // rounds are necessary; {2} then {1, 3, 4} is loop-free.
    assert_eq!(solution.number_of_rounds(), Some(2));
    let objective = solution.status.objective.unwrap();
    assert!((objective - 2.0).abs() < 1e-4);
}

#[test]
fn test_strong_needs_at_least_as_many_rounds_as_relaxed() {
    let instance = five_node_instance(vec![]);
    let relaxed = solve(&instance, ModelConfiguration::default());
    let strong = solve(
        &instance,
        ModelConfiguration { strong_loop_freedom: true, ..Default::default() },
    );
    assert!(relaxed.status.is_optimal());
    assert!(strong.status.is_optimal());
    assert_schedule_valid(&instance, &strong);
    assert!(strong.number_of_rounds().unwrap() >= relaxed.number_of_rounds().unwrap());
}

#[test]
fn test_flow_extension_preserves_optimum() {
    let instance = five_node_instance(vec![]);
    let plain = solve(&instance, ModelConfiguration::default());
    let with_flow = solve(
        &instance,
        ModelConfiguration { use_flow_extension: true, ..Default::default() },
    );
    assert!(with_flow.status.is_optimal());
    assert_schedule_valid(&instance, &with_flow);
    assert_eq!(with_flow.number_of_rounds(), plain.number_of_rounds());
}

#[test]
fn test_infeasible_round_horizon() {
    let mut instance = five_node_instance(vec![]);
    // one round with exactly one upgrade cannot cover four nodes
    instance.rounds = 1;
    let configuration = ModelConfiguration { decision_variant: true, ..Default::default() };
    let solution = solve(&instance, configuration);
    assert!(solution.status.is_infeasible());
    assert!(solution.schedule.is_none());
    assert!(matches!(solution.schedule(), Err(Error::IllegalState(_))));
    assert_eq!(
        ExtractedSolution::from_solution(&solution).class,
        SolutionClass::Infeasible
    );
}

#[test]
fn test_stop_on_solution_limit_keeps_incumbent() {
    let mut rng = StdRng::seed_from_u64(4);
    let instance = NetworkUpdateInstance::generate(9, 1, &mut rng, 10_000).unwrap();
    // stop at the first incumbent, with a gap that rules out an early optimality proof
    let settings = SolverSettings {
        time_limit: 60.0,
        mip_gap: 0.0,
        solution_limit: Some(1),
        ..Default::default()
    };
    let solution = ModelBuilder::new(&instance, ModelConfiguration::default())
        .unwrap()
        .solve(&settings)
        .unwrap();

    // the incumbent found before the stop must survive it
    assert!(solution.status.is_feasible());
    assert!(solution.status.objective.is_some());
    assert_schedule_valid(&instance, &solution);

    let extracted = ExtractedSolution::from_solution(&solution);
    assert!(matches!(extracted.class, SolutionClass::Feasible | SolutionClass::Optimal));
    assert!(extracted.first_incumbent_objective.is_some());
}

#[test]
fn test_waypoint_forces_ordering() {
    let instance = five_node_instance(vec![3]);
    let solution = solve(&instance, ModelConfiguration::default());
    assert!(solution.status.is_optimal());
    assert_schedule_valid(&instance, &solution);
    // bypass protection of node 3 forces 1 before 2, loop freedom forces 2 before 3
    assert_eq!(solution.number_of_rounds(), Some(3));
    let schedule = solution.schedule().unwrap();
    let round_of = |v: Node| {
        schedule
            .iter()
            .find(|(_, nodes)| nodes.contains(&v))
            .map(|(r, _)| *r)
            .unwrap()
    };
    assert!(round_of(1) < round_of(2));
    assert!(round_of(2) < round_of(3));
}

#[test]
fn test_all_configurations_agree_on_feasibility() {
    let instance = five_node_instance(vec![3]);
    let mut results = Vec::new();
    for configuration in ModelConfiguration::all() {
        let solution = solve(&instance, configuration);
        results.push(solution.status.is_feasible());
    }
    assert!(results.iter().all(|f| *f == results[0]));
}
