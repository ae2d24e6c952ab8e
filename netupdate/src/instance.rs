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

//! # Problem Instances
//!
//! This module contains the data model of the network update problem:
//! [`NetworkUpdateInstance`] (two forwarding paths over a common node set, plus waypoints), the
//! uniform random generator producing structurally valid instances via rejection sampling, and
//! [`InstanceStorage`], which owns the seeded random number stream and generates entire
//! de-duplicated batches over a [`ParameterSpace`].

use crate::Error;

use itertools::iproduct;
use log::*;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Node identifier. Nodes of an instance are the contiguous integers `1..=N`.
pub type Node = u32;
/// Directed edge between two nodes.
pub type Edge = (Node, Node);

/// # Network Update Instance
///
/// An instance of the network update problem: a common set of nodes, the old policy
/// (`old_edges`), the new policy (`new_edges`), the common `start` and `end` node, and the
/// ordered list of waypoints the new policy must visit in order.
///
/// Both edge lists form a simple path from `start` to `end` covering every node. The `rounds`
/// field is the upper bound on the scheduling horizon (defaults to `N - 1` for generated
/// instances).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUpdateInstance {
    /// All nodes, ordered, with `nodes.last() == end`.
    pub nodes: Vec<Node>,
    /// The old forwarding path as a directed edge list.
    pub old_edges: Vec<Edge>,
    /// The new forwarding path as a directed edge list.
    pub new_edges: Vec<Edge>,
    /// The node where all traffic enters.
    pub start: Node,
    /// The node where all traffic leaves.
    pub end: Node,
    /// Waypoints in the order in which the new path must visit them.
    pub waypoints: Vec<Node>,
    /// Upper bound on the number of scheduling rounds.
    pub rounds: usize,
}

impl NetworkUpdateInstance {
    /// Generate an instance uniformly at random.
    ///
    /// The old policy is fixed to the path `1 → 2 → … → N`. A candidate new path is drawn as a
    /// uniform permutation of the interior nodes and rejected whenever it would silently
    /// reproduce an old edge (the first edge `(1, 2)`, any pair of adjacent integers, or the
    /// last edge `(N-1, N)`), or whenever the chosen waypoints do not appear in increasing order
    /// along the candidate. The feasible region shrinks combinatorially with many waypoints on
    /// few nodes, so `max_iterations` bounds the sampling loop; exhaustion fails with
    /// [`Error::GenerationFailure`] and never returns a degraded instance.
    pub fn generate(
        number_of_nodes: usize,
        number_of_waypoints: usize,
        rng: &mut impl Rng,
        max_iterations: usize,
    ) -> Result<Self, Error> {
        if number_of_nodes < 3 {
            return Err(Error::InvalidParameter(format!(
                "cannot generate an instance with {} nodes (minimum is 3)",
                number_of_nodes
            )));
        }
        if number_of_waypoints > number_of_nodes - 2 {
            return Err(Error::InvalidParameter(format!(
                "cannot place {} waypoints on {} interior nodes",
                number_of_waypoints,
                number_of_nodes - 2
            )));
        }

        let n = number_of_nodes as Node;
        let nodes: Vec<Node> = (1..=n).collect();
        let old_edges: Vec<Edge> = (1..n).map(|x| (x, x + 1)).collect();
        let interior: Vec<Node> = (2..n).collect();

        for _ in 0..max_iterations {
            // waypoints are re-drawn on every attempt, so that they stay independent of the
            // rejected permutations.
            let mut pool = interior.clone();
            pool.shuffle(rng);
            let mut waypoints: Vec<Node> = pool[..number_of_waypoints].to_vec();
            waypoints.sort_unstable();

            let mut perm = interior.clone();
            perm.shuffle(rng);

            if Self::reject_candidate(&perm, &waypoints, n) {
                continue;
            }

            let mut new_edges: Vec<Edge> = Vec::with_capacity(perm.len() + 1);
            new_edges.push((1, perm[0]));
            for w in perm.windows(2) {
                new_edges.push((w[0], w[1]));
            }
            new_edges.push((perm[perm.len() - 1], n));

            return Ok(Self {
                nodes,
                old_edges,
                new_edges,
                start: 1,
                end: n,
                waypoints,
                rounds: number_of_nodes - 1,
            });
        }

        Err(Error::GenerationFailure(format!(
            "no valid instance with {} nodes and {} waypoints found within {} attempts",
            number_of_nodes, number_of_waypoints, max_iterations
        )))
    }

    /// Check whether a candidate interior permutation must be rejected.
    fn reject_candidate(perm: &[Node], waypoints: &[Node], n: Node) -> bool {
        // would reproduce the old edge (1, 2)
        if perm[0] == 2 {
            return true;
        }
        // adjacent integers would reproduce an interior old edge
        if perm.windows(2).any(|w| w[0] + 1 == w[1]) {
            return true;
        }
        // would reproduce the old edge (N-1, N)
        if perm[perm.len() - 1] == n - 1 {
            return true;
        }
        // waypoints must appear along the candidate in increasing order
        let mut last_position = None;
        for wp in waypoints {
            let position = perm.iter().position(|x| x == wp);
            if position < last_position {
                return true;
            }
            last_position = position;
        }
        false
    }

    /// The canonical, hashable representation of this instance, used to de-duplicate batches.
    pub fn sequence_representation(&self) -> SequenceRepresentation {
        SequenceRepresentation {
            nodes: self.nodes.clone(),
            old_edges: self.old_edges.clone(),
            new_edges: self.new_edges.clone(),
            waypoints: self.waypoints.clone(),
        }
    }

    /// Check all structural invariants: both edge lists are simple paths from `start` to `end`
    /// covering every node, the last node is the end node, the waypoints are interior nodes
    /// appearing along the new path in strictly increasing positions, and the round horizon is
    /// at least one.
    pub fn validate(&self) -> Result<(), Error> {
        if self.nodes.is_empty() {
            return Err(Error::InvariantViolation("instance has no nodes".to_string()));
        }
        if self.nodes[self.nodes.len() - 1] != self.end {
            return Err(Error::InvariantViolation(format!(
                "the last node ({}) must be the end node ({})",
                self.nodes[self.nodes.len() - 1],
                self.end
            )));
        }
        if self.rounds == 0 {
            return Err(Error::InvariantViolation("round horizon must be at least 1".to_string()));
        }
        self.check_simple_path(&self.old_edges, "old_edges")?;
        let new_order = self.check_simple_path(&self.new_edges, "new_edges")?;

        let position: HashMap<Node, usize> =
            new_order.iter().enumerate().map(|(i, v)| (*v, i)).collect();
        let mut last_position = 0;
        for wp in self.waypoints.iter() {
            if *wp == self.start || *wp == self.end {
                return Err(Error::InvariantViolation(format!(
                    "waypoint {} must be an interior node",
                    wp
                )));
            }
            match position.get(wp) {
                Some(p) if *p > last_position => last_position = *p,
                Some(_) => {
                    return Err(Error::InvariantViolation(format!(
                        "waypoint {} is out of order along the new path",
                        wp
                    )))
                }
                None => {
                    return Err(Error::InvariantViolation(format!(
                        "waypoint {} does not lie on the new path",
                        wp
                    )))
                }
            }
        }
        Ok(())
    }

    /// Walk an edge list from `start` and check that it is a simple path to `end` covering all
    /// nodes. Returns the node order along the path.
    fn check_simple_path(&self, edges: &[Edge], name: &str) -> Result<Vec<Node>, Error> {
        let mut successor: HashMap<Node, Node> = HashMap::with_capacity(edges.len());
        for (tail, head) in edges.iter() {
            if successor.insert(*tail, *head).is_some() {
                return Err(Error::InvariantViolation(format!(
                    "{}: node {} has more than one outgoing edge",
                    name, tail
                )));
            }
        }
        let node_set: HashSet<Node> = self.nodes.iter().copied().collect();
        let mut order = vec![self.start];
        let mut visited: HashSet<Node> = order.iter().copied().collect();
        let mut current = self.start;
        while let Some(next) = successor.get(&current) {
            if !visited.insert(*next) {
                return Err(Error::InvariantViolation(format!(
                    "{}: node {} is visited twice",
                    name, next
                )));
            }
            if !node_set.contains(next) {
                return Err(Error::InvariantViolation(format!(
                    "{}: node {} is not part of the instance",
                    name, next
                )));
            }
            order.push(*next);
            current = *next;
        }
        if current != self.end {
            return Err(Error::InvariantViolation(format!(
                "{}: path ends at node {} instead of the end node {}",
                name, current, self.end
            )));
        }
        if order.len() != self.nodes.len() {
            return Err(Error::InvariantViolation(format!(
                "{}: path covers {} of {} nodes",
                name,
                order.len(),
                self.nodes.len()
            )));
        }
        Ok(order)
    }
}

/// Canonical sequence representation of an instance (ordered nodes, old edges, new edges and
/// waypoint values). Two instances are duplicates if and only if their representations are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceRepresentation {
    nodes: Vec<Node>,
    old_edges: Vec<Edge>,
    new_edges: Vec<Edge>,
    waypoints: Vec<Node>,
}

/// Generation parameters of a single instance: its size, its number of waypoints, and the
/// repetition index distinguishing instances drawn with otherwise identical parameters.
/// Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceGenerationParameters {
    /// Number of nodes of the instance.
    pub number_of_nodes: usize,
    /// Number of waypoints of the instance.
    pub number_of_waypoints: usize,
    /// Repetition index.
    pub repetition: usize,
}

impl fmt::Display for InstanceGenerationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {}, waypoints: {}, repetition: {}",
            self.number_of_nodes, self.number_of_waypoints, self.repetition
        )
    }
}

/// The parameter space of a generation job: every combination of node count, waypoint count and
/// repetition index yields one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpace {
    /// Node counts to generate.
    pub number_of_nodes: Vec<usize>,
    /// Waypoint counts to generate. May be empty, in which case all instances are generated
    /// without waypoints.
    pub number_of_waypoints: Vec<usize>,
    /// Repetition indices.
    pub repetitions: Vec<usize>,
}

impl fmt::Display for ParameterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {:?}, waypoints: {:?}, repetitions: {:?}",
            self.number_of_nodes, self.number_of_waypoints, self.repetitions
        )
    }
}

fn skipped_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// # Instance Storage
///
/// An ordered collection of instances generated uniformly at random, keyed by a numeric index.
/// The storage has an identifier (which should be unique) to later trace the origin of
/// experiments, and exclusively owns the seeded random number stream used throughout the
/// generation. No two instances within one storage share the same sequence representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceStorage {
    /// Unique identifier of this storage.
    pub identifier: String,
    /// Seed of the random number stream.
    pub seed: u64,
    /// The parameter space from which the contained instances were generated.
    pub parameter_space: ParameterSpace,
    /// The generated instances, by numeric index.
    pub instances: BTreeMap<usize, NetworkUpdateInstance>,
    /// The generation parameters of each contained instance.
    pub index_to_parameters: BTreeMap<usize, InstanceGenerationParameters>,
    /// Random number stream, exclusively owned by this storage. The stream is not part of the
    /// serialized form; a deserialized storage is read-only with respect to generation.
    #[serde(skip, default = "skipped_rng")]
    rng: StdRng,
}

impl InstanceStorage {
    /// Create an empty storage with the given identifier and seed.
    pub fn new(
        identifier: impl Into<String>,
        parameter_space: ParameterSpace,
        seed: u64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            seed,
            parameter_space,
            instances: BTreeMap::new(),
            index_to_parameters: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate one instance for every point of the parameter space, starting at `index_offset`.
    ///
    /// Every generated instance must be novel: its sequence representation must not be contained
    /// in `seen`. The set may be pre-populated with the representations of previously generated
    /// storages, which allows extending a batch without ever repeating an instance. Violations
    /// retry the generation, bounded by `max_iterations`, and fail with
    /// [`Error::GenerationFailure`] instead of accepting a duplicate.
    pub fn generate(
        &mut self,
        index_offset: usize,
        seen: &mut HashSet<SequenceRepresentation>,
        max_iterations: usize,
    ) -> Result<(), Error> {
        let mut index = index_offset;
        let space = self.parameter_space.clone();
        if space.number_of_waypoints.is_empty() {
            for (repetition, number_of_nodes) in
                iproduct!(space.repetitions.iter(), space.number_of_nodes.iter())
            {
                let parameters = InstanceGenerationParameters {
                    number_of_nodes: *number_of_nodes,
                    number_of_waypoints: 0,
                    repetition: *repetition,
                };
                self.generate_unique(index, parameters, seen, max_iterations)?;
                index += 1;
            }
        } else {
            for (number_of_waypoints, repetition, number_of_nodes) in iproduct!(
                space.number_of_waypoints.iter(),
                space.repetitions.iter(),
                space.number_of_nodes.iter()
            ) {
                let parameters = InstanceGenerationParameters {
                    number_of_nodes: *number_of_nodes,
                    number_of_waypoints: *number_of_waypoints,
                    repetition: *repetition,
                };
                self.generate_unique(index, parameters, seen, max_iterations)?;
                index += 1;
            }
        }
        info!("generated {} instances for storage {}", self.instances.len(), self.identifier);
        Ok(())
    }

    /// Generate a single novel instance according to `parameters` and store it under `index`.
    fn generate_unique(
        &mut self,
        index: usize,
        parameters: InstanceGenerationParameters,
        seen: &mut HashSet<SequenceRepresentation>,
        max_iterations: usize,
    ) -> Result<(), Error> {
        for _ in 0..max_iterations {
            let instance = NetworkUpdateInstance::generate(
                parameters.number_of_nodes,
                parameters.number_of_waypoints,
                &mut self.rng,
                max_iterations,
            )?;
            let representation = instance.sequence_representation();
            if seen.insert(representation) {
                trace!("instance {} generated ({})", index, parameters);
                self.instances.insert(index, instance);
                self.index_to_parameters.insert(index, parameters);
                return Ok(());
            }
        }
        Err(Error::GenerationFailure(format!(
            "could not generate a novel instance for ({}) within {} attempts",
            parameters, max_iterations
        )))
    }

    /// Number of instances contained in this storage.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if the storage contains no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The sequence representations of all contained instances.
    pub fn representations(&self) -> HashSet<SequenceRepresentation> {
        self.instances.values().map(|i| i.sequence_representation()).collect()
    }

    /// The largest instance index contained in this storage, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.instances.keys().next_back().copied()
    }
}
