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

#![deny(missing_docs)]

//! # Netupdate: Computing Loop-Free Network Update Schedules
//!
//! This is a library for computing minimum-round schedules that migrate a network from an old
//! forwarding policy to a new one, such that no forwarding loop can form and no mandated waypoint
//! can be bypassed at any moment during the transition. On top of the scheduling core, the library
//! contains the machinery to run large batches of randomly generated problem instances for
//! empirical studies.
//!
//! ## Problem Statement
//! Given
//! - a set of nodes, an old forwarding path and a new forwarding path, both leading from a
//!   distinguished `start` node to a distinguished `end` node,
//! - an ordered set of waypoints which the new path visits in order,
//!
//! find an assignment of nodes to update rounds, such that after every round (and during every
//! transient moment between two rounds), the forwarding state is loop-free and no packet can
//! reach `end` while bypassing a waypoint. The number of used rounds is minimized.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`instance`]**: The problem data model. The main structure is
//!   [`NetworkUpdateInstance`](instance::NetworkUpdateInstance), which can be generated uniformly
//!   at random (rejection sampling), and [`InstanceStorage`](instance::InstanceStorage), which
//!   owns the seeded random number stream and generates de-duplicated batches over a whole
//!   parameter space.
//!
//! - **[`model`]**: The Mixed-Integer Program formulation. A
//!   [`ModelBuilder`](model::ModelBuilder) turns one instance and one
//!   [`ModelConfiguration`](model::ModelConfiguration) into decision variables and constraints
//!   for the external MIP solver (CBC, via `good_lp`), solves it, and returns a typed
//!   [`NetworkUpdateSolution`](model::NetworkUpdateSolution).
//!
//! - **[`experiment`]**: The batch executor. An
//!   [`ExperimentExecutor`](experiment::ExperimentExecutor) partitions an instance storage into
//!   slices, solves every (instance, configuration) pair of its slice in an isolated worker, and
//!   accumulates the results in an [`ExperimentStorage`](experiment::ExperimentStorage), which
//!   can be merged with the storages produced by other slices.
//!
//! The solver itself is treated as a black-box collaborator: this library builds the model,
//! passes the solver parameters through, and interprets the outcome. Branch-and-bound internals
//! stay outside.

pub mod experiment;
pub mod instance;
pub mod model;

mod error;
mod test;

pub use error::Error;
