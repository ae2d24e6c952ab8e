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

use crate::instance::{InstanceStorage, NetworkUpdateInstance, ParameterSpace};
use crate::Error;

use rand::prelude::*;

use std::collections::HashSet;

#[test]
fn test_generate_rejects_too_few_nodes() {
    let mut rng = StdRng::seed_from_u64(0);
    match NetworkUpdateInstance::generate(2, 0, &mut rng, 100) {
        Err(Error::InvalidParameter(_)) => {}
        r => panic!("expected InvalidParameter, got {:?}", r),
    }
}

#[test]
fn test_generate_exhausts_on_three_nodes() {
    // with a single interior node, every candidate reproduces the old path.
    let mut rng = StdRng::seed_from_u64(0);
    match NetworkUpdateInstance::generate(3, 0, &mut rng, 1000) {
        Err(Error::GenerationFailure(_)) => {}
        r => panic!("expected GenerationFailure, got {:?}", r),
    }
}

#[test]
fn test_generate_rejects_too_many_waypoints() {
    let mut rng = StdRng::seed_from_u64(0);
    match NetworkUpdateInstance::generate(5, 4, &mut rng, 100) {
        Err(Error::InvalidParameter(_)) => {}
        r => panic!("expected InvalidParameter, got {:?}", r),
    }
}

#[test]
fn test_generated_instances_are_valid() {
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        for n in 6..=12 {
            for wps in 0..=2 {
                let instance = NetworkUpdateInstance::generate(n, wps, &mut rng, 10_000)
                    .expect("generation must succeed for these sizes");
                instance.validate().expect("generated instance must be valid");
                assert_eq!(instance.start, 1);
                assert_eq!(instance.end, n as u32);
                assert_eq!(instance.rounds, n - 1);
                assert_eq!(instance.waypoints.len(), wps);
                // the sampling rejects every candidate sharing an edge with the old path
                let old: HashSet<_> = instance.old_edges.iter().collect();
                assert!(instance.new_edges.iter().all(|e| !old.contains(e)));
            }
        }
    }
}

#[test]
fn test_generation_is_deterministic() {
    let mut rng_a = StdRng::seed_from_u64(42);
    let mut rng_b = StdRng::seed_from_u64(42);
    let a = NetworkUpdateInstance::generate(8, 2, &mut rng_a, 10_000).unwrap();
    let b = NetworkUpdateInstance::generate(8, 2, &mut rng_b, 10_000).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_validate_rejects_broken_paths() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut instance = NetworkUpdateInstance::generate(6, 0, &mut rng, 10_000).unwrap();
    // point two nodes at the same successor
    instance.new_edges[1].1 = instance.new_edges[2].1;
    match instance.validate() {
        Err(Error::InvariantViolation(_)) => {}
        r => panic!("expected InvariantViolation, got {:?}", r),
    }
}

#[test]
fn test_validate_rejects_waypoint_out_of_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut instance = loop {
        let i = NetworkUpdateInstance::generate(8, 2, &mut rng, 10_000).unwrap();
        if i.waypoints.len() == 2 {
            break i;
        }
    };
    instance.waypoints.reverse();
    match instance.validate() {
        Err(Error::InvariantViolation(_)) => {}
        r => panic!("expected InvariantViolation, got {:?}", r),
    }
}

fn space() -> ParameterSpace {
    ParameterSpace {
        number_of_nodes: vec![7, 15],
        number_of_waypoints: vec![0, 1, 2],
        repetitions: vec![0, 1, 2],
    }
}

#[test]
fn test_storage_covers_parameter_space() {
    let mut storage = InstanceStorage::new("test", space(), 1337);
    let mut seen = HashSet::new();
    storage.generate(0, &mut seen, 10_000).unwrap();

    assert_eq!(storage.len(), 18);
    assert_eq!(storage.max_index(), Some(17));

    // every parameter triple appears exactly once
    let mut expected = HashSet::new();
    for n in &[7usize, 15] {
        for w in &[0usize, 1, 2] {
            for r in &[0usize, 1, 2] {
                expected.insert((*n, *w, *r));
            }
        }
    }
    for (index, parameters) in storage.index_to_parameters.iter() {
        let instance = &storage.instances[index];
        assert_eq!(instance.nodes.len(), parameters.number_of_nodes);
        assert_eq!(instance.waypoints.len(), parameters.number_of_waypoints);
        let triple = (
            parameters.number_of_nodes,
            parameters.number_of_waypoints,
            parameters.repetition,
        );
        assert!(expected.remove(&triple), "triple {:?} generated twice", triple);
    }
    assert!(expected.is_empty(), "missing triples: {:?}", expected);

    // all representations distinct within the storage
    assert_eq!(storage.representations().len(), 18);
}

#[test]
fn test_storage_without_waypoint_axis() {
    let space = ParameterSpace {
        number_of_nodes: vec![6, 8],
        number_of_waypoints: vec![],
        repetitions: vec![0, 1],
    };
    let mut storage = InstanceStorage::new("test", space, 1);
    let mut seen = HashSet::new();
    storage.generate(0, &mut seen, 10_000).unwrap();
    assert_eq!(storage.len(), 4);
    assert!(storage.instances.values().all(|i| i.waypoints.is_empty()));
}

#[test]
fn test_storage_extension_never_repeats() {
    let space = ParameterSpace {
        number_of_nodes: vec![6],
        number_of_waypoints: vec![],
        repetitions: (0..5).collect(),
    };

    let mut first = InstanceStorage::new("batch", space.clone(), 1);
    let mut seen = HashSet::new();
    first.generate(0, &mut seen, 10_000).unwrap();

    let mut second = InstanceStorage::new("batch_extension", space, 2);
    second.generate(first.len(), &mut seen, 10_000).unwrap();

    assert_eq!(second.instances.keys().next().copied(), Some(5));
    assert_eq!(second.max_index(), Some(9));
    let first_reprs = first.representations();
    for repr in second.representations() {
        assert!(!first_reprs.contains(&repr));
    }
}
