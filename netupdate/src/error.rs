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

//! Module containing all error types

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was outside of its allowed range. Raised before any generation or solving
    /// takes place.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// No valid (or no novel) instance was found within the allowed number of attempts.
    #[error("Instance generation failed: {0}")]
    GenerationFailure(String),
    /// A structural invariant of an instance does not hold (e.g., the last node is not the end
    /// node). Raised before model construction.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// Programmer-level misuse, like requesting a schedule from a model that was proven
    /// infeasible. True infeasibility is a reportable classification, never an error.
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// Two experiment storages contain a solution for the same (instance, configuration) key.
    /// This indicates overlapping work units and is fatal.
    #[error("Merge conflict: {0}")]
    MergeConflict(String),
}
