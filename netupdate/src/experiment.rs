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

//! # Experiment Execution
//!
//! This module runs whole batches of solves. An [`ExperimentExecutor`] takes one slice of an
//! [`InstanceStorage`] (round-robin partition over the instance indices, so that a batch can be
//! spread over many machines by launching one process per slice), solves every (instance,
//! configuration) pair of that slice, and collects the outcomes in an [`ExperimentStorage`].
//! Storages produced by different slices of the same batch can later be merged into one.
//!
//! Every single solve runs on its own, freshly spawned worker thread which is joined before the
//! next solve starts. The solves are therefore strictly sequential, but all model and solver
//! state is dropped with the worker, keeping the footprint of a long batch flat.

use crate::instance::{
    InstanceGenerationParameters, InstanceStorage, NetworkUpdateInstance, ParameterSpace,
};
use crate::model::{
    ExtractedSolution, ModelBuilder, ModelConfiguration, NetworkUpdateSolution, SolverSettings,
};
use crate::Error;

use log::*;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::mpsc;
use std::thread;

/// Distribute `indices` over `number_of_slices` slices in round-robin fashion. The result has
/// exactly `number_of_slices` entries; slice `s` receives the indices at positions
/// `s, s + number_of_slices, ...`.
pub fn partition(indices: &[usize], number_of_slices: usize) -> Result<Vec<Vec<usize>>, Error> {
    if number_of_slices == 0 {
        return Err(Error::InvalidParameter(
            "number of slices must be at least 1".to_string(),
        ));
    }
    let mut slices: Vec<Vec<usize>> = vec![Vec::new(); number_of_slices];
    for (position, index) in indices.iter().enumerate() {
        slices[position % number_of_slices].push(*index);
    }
    Ok(slices)
}

type SolutionMap = BTreeMap<usize, HashMap<ModelConfiguration, NetworkUpdateSolution>>;

/// Serialize the solution map with the configuration-keyed inner maps flattened into pair lists,
/// since structured map keys cannot be represented in JSON.
mod solution_map_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &SolutionMap, s: S) -> Result<S::Ok, S::Error> {
        let flat: BTreeMap<&usize, Vec<(&ModelConfiguration, &NetworkUpdateSolution)>> =
            map.iter().map(|(k, v)| (k, v.iter().collect())).collect();
        flat.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SolutionMap, D::Error> {
        let flat: BTreeMap<usize, Vec<(ModelConfiguration, NetworkUpdateSolution)>> =
            BTreeMap::deserialize(d)?;
        Ok(flat.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect())
    }
}

/// # Experiment Storage
///
/// The solutions of one batch (or one slice of a batch), keyed by instance index and model
/// configuration, together with the instances themselves and their generation parameters. The
/// `identifier` names the [`InstanceStorage`] the results belong to; merging storages of
/// different origins is refused.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentStorage {
    /// Identifier of the instance storage these results belong to.
    pub identifier: String,
    /// The parameter space of the originating instance storage, if known.
    pub parameter_space: Option<ParameterSpace>,
    /// The instances for which solutions are contained.
    pub instances: BTreeMap<usize, NetworkUpdateInstance>,
    /// The generation parameters of each contained instance.
    pub generation_parameters: BTreeMap<usize, InstanceGenerationParameters>,
    /// All model configurations for which any solution is contained.
    pub configurations: BTreeSet<ModelConfiguration>,
    /// The solutions, keyed by instance index and configuration.
    #[serde(with = "solution_map_serde")]
    pub solutions: SolutionMap,
}

impl ExperimentStorage {
    /// Create an empty storage for results belonging to the named instance storage.
    pub fn new(identifier: impl Into<String>, parameter_space: Option<ParameterSpace>) -> Self {
        Self {
            identifier: identifier.into(),
            parameter_space,
            instances: BTreeMap::new(),
            generation_parameters: BTreeMap::new(),
            configurations: BTreeSet::new(),
            solutions: SolutionMap::new(),
        }
    }

    /// Store the solution of one solve.
    ///
    /// The instance and its generation parameters are stored alongside, so that a merged storage
    /// is self-contained. Re-adding an instance index with different generation parameters fails
    /// with [`Error::IllegalState`]; re-adding a solution for an existing (instance,
    /// configuration) key overwrites it with a warning.
    pub fn add_instance_solution(
        &mut self,
        instance_index: usize,
        instance: &NetworkUpdateInstance,
        parameters: InstanceGenerationParameters,
        configuration: ModelConfiguration,
        solution: NetworkUpdateSolution,
    ) -> Result<(), Error> {
        match self.generation_parameters.get(&instance_index) {
            Some(existing) if *existing != parameters => {
                return Err(Error::IllegalState(format!(
                    "instance {} was already stored with different generation parameters",
                    instance_index
                )));
            }
            Some(_) => {}
            None => {
                self.generation_parameters.insert(instance_index, parameters);
            }
        }
        self.instances.insert(instance_index, instance.clone());
        self.configurations.insert(configuration);
        let previous = self
            .solutions
            .entry(instance_index)
            .or_insert_with(HashMap::new)
            .insert(configuration, solution);
        if previous.is_some() {
            warn!(
                "overwriting solution of instance {} for configuration ({})",
                instance_index, configuration
            );
        }
        Ok(())
    }

    /// Merge the results of `other` into this storage.
    ///
    /// Intended for combining the slices of one partitioned batch: the storages must refer to
    /// the same instance storage (an empty identifier adopts the other's), and no (instance,
    /// configuration) key may be present in both, since overlapping slices indicate duplicated
    /// work and would silently discard one of the two solutions. Duplicated instances alone are
    /// tolerated with a warning, as two slices may legitimately carry the same instance under
    /// different configurations.
    pub fn merge(&mut self, other: ExperimentStorage) -> Result<(), Error> {
        if self.identifier.is_empty() {
            self.identifier = other.identifier.clone();
        } else if self.identifier != other.identifier {
            return Err(Error::MergeConflict(format!(
                "cannot merge results of instance storage '{}' into results of '{}'",
                other.identifier, self.identifier
            )));
        }

        if self.parameter_space.is_none() {
            self.parameter_space = other.parameter_space.clone();
        } else if other.parameter_space.is_some() && self.parameter_space != other.parameter_space
        {
            warn!("merging experiment storages with different parameter spaces");
        }

        for (index, parameters) in other.generation_parameters.into_iter() {
            match self.generation_parameters.get(&index) {
                Some(existing) if *existing != parameters => {
                    return Err(Error::MergeConflict(format!(
                        "instance {} has different generation parameters in the two storages",
                        index
                    )));
                }
                _ => {
                    self.generation_parameters.insert(index, parameters);
                }
            }
        }

        for (index, instance) in other.instances.into_iter() {
            if self.instances.insert(index, instance).is_some() {
                warn!("experiment storage already contained instance {}", index);
            }
        }

        self.configurations.extend(other.configurations.into_iter());

        for (index, per_configuration) in other.solutions.into_iter() {
            let target = self.solutions.entry(index).or_insert_with(HashMap::new);
            for (configuration, solution) in per_configuration.into_iter() {
                if target.contains_key(&configuration) {
                    return Err(Error::MergeConflict(format!(
                        "both storages contain a solution for instance {} and configuration ({})",
                        index, configuration
                    )));
                }
                target.insert(configuration, solution);
            }
        }

        info!("merged experiment storage ({} instances total)", self.instances.len());
        Ok(())
    }

    /// Total number of stored solutions.
    pub fn number_of_solutions(&self) -> usize {
        self.solutions.values().map(|m| m.len()).sum()
    }

    /// Look up the solution for one (instance, configuration) key.
    pub fn get_solution(
        &self,
        instance_index: usize,
        configuration: &ModelConfiguration,
    ) -> Option<&NetworkUpdateSolution> {
        self.solutions.get(&instance_index).and_then(|m| m.get(configuration))
    }

    /// All stored solutions in reduced form, ordered by instance index and configuration, for
    /// reporting.
    pub fn extracted_solutions(
        &self,
    ) -> Vec<(usize, ModelConfiguration, ExtractedSolution)> {
        let mut result = Vec::with_capacity(self.number_of_solutions());
        for (index, per_configuration) in self.solutions.iter() {
            let mut ordered: Vec<_> = per_configuration.iter().collect();
            ordered.sort_by_key(|(c, _)| **c);
            for (configuration, solution) in ordered {
                result.push((*index, *configuration, ExtractedSolution::from_solution(solution)));
            }
        }
        result
    }
}

/// # Experiment Executor
///
/// Solves one slice of an instance storage under a list of model configurations and accumulates
/// the results. All parameters are validated when the executor is created, so that a misconfigured
/// batch fails before the first (potentially expensive) solve.
pub struct ExperimentExecutor<'a> {
    instance_storage: &'a InstanceStorage,
    slice_to_execute: usize,
    number_of_slices: usize,
    configurations: Vec<ModelConfiguration>,
    settings: SolverSettings,
    storage: ExperimentStorage,
}

impl<'a> ExperimentExecutor<'a> {
    /// Create an executor for one slice of the given storage.
    pub fn new(
        instance_storage: &'a InstanceStorage,
        slice_to_execute: usize,
        number_of_slices: usize,
        configurations: Vec<ModelConfiguration>,
        settings: SolverSettings,
    ) -> Result<Self, Error> {
        if number_of_slices == 0 {
            return Err(Error::InvalidParameter(
                "number of slices must be at least 1".to_string(),
            ));
        }
        if slice_to_execute >= number_of_slices {
            return Err(Error::InvalidParameter(format!(
                "slice {} does not exist with {} slices",
                slice_to_execute, number_of_slices
            )));
        }
        if configurations.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one model configuration is required".to_string(),
            ));
        }
        settings.validate()?;
        for (index, instance) in instance_storage.instances.iter() {
            if !instance_storage.index_to_parameters.contains_key(index) {
                return Err(Error::InvalidParameter(format!(
                    "instance {} has no generation parameters",
                    index
                )));
            }
            instance.validate().map_err(|e| {
                Error::InvalidParameter(format!("instance {} is invalid: {}", index, e))
            })?;
        }

        let storage = ExperimentStorage::new(
            instance_storage.identifier.clone(),
            Some(instance_storage.parameter_space.clone()),
        );

        Ok(Self {
            instance_storage,
            slice_to_execute,
            number_of_slices,
            configurations,
            settings,
            storage,
        })
    }

    /// The instance indices belonging to the selected slice.
    pub fn indices_to_execute(&self) -> Result<Vec<usize>, Error> {
        let all_indices: Vec<usize> = self.instance_storage.instances.keys().copied().collect();
        let slices = partition(&all_indices, self.number_of_slices)?;
        Ok(slices.into_iter().nth(self.slice_to_execute).unwrap_or_default())
    }

    /// Solve every (instance, configuration) pair of the selected slice.
    ///
    /// Solver failures of a single pair abort the batch; infeasible models do not, as
    /// infeasibility is a recorded outcome.
    pub fn execute_all_instances(&mut self) -> Result<(), Error> {
        let indices = self.indices_to_execute()?;
        let total = indices.len();

        for (position, index) in indices.iter().enumerate() {
            let instance = &self.instance_storage.instances[index];
            let parameters = self.instance_storage.index_to_parameters[index];
            for configuration in self.configurations.clone() {
                info!(
                    "starting experiment {} of {}: instance {}, configuration ({})",
                    position + 1,
                    total,
                    index,
                    configuration
                );
                let solution = Self::solve_isolated(instance, configuration, self.settings)?;
                self.storage.add_instance_solution(
                    *index,
                    instance,
                    parameters,
                    configuration,
                    solution,
                )?;
            }
        }
        Ok(())
    }

    /// Run one solve on a dedicated worker thread and wait for its result. The worker owns its
    /// copy of the instance and all solver state, which is dropped when the worker is joined.
    fn solve_isolated(
        instance: &NetworkUpdateInstance,
        configuration: ModelConfiguration,
        settings: SolverSettings,
    ) -> Result<NetworkUpdateSolution, Error> {
        let (tx, rx) = mpsc::channel();
        let worker_instance = instance.clone();
        let worker = thread::spawn(move || {
            let result = ModelBuilder::new(&worker_instance, configuration)
                .and_then(|builder| builder.solve(&settings));
            // the receiver outlives the worker unless the main thread panicked.
            tx.send(result).ok();
        });
        let result = rx.recv().map_err(|_| {
            Error::IllegalState("solver worker terminated without a result".to_string())
        });
        worker
            .join()
            .map_err(|_| Error::IllegalState("solver worker panicked".to_string()))?;
        result?
    }

    /// The accumulated results.
    pub fn storage(&self) -> &ExperimentStorage {
        &self.storage
    }

    /// Consume the executor, yielding the accumulated results.
    pub fn into_storage(self) -> ExperimentStorage {
        self.storage
    }
}
