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

//! Command line interface for generating instance batches, executing experiment slices, merging
//! slice results, and printing result summaries. Storages are persisted as JSON files.

use netupdate::experiment::{ExperimentExecutor, ExperimentStorage};
use netupdate::instance::{InstanceStorage, ParameterSpace, SequenceRepresentation};
use netupdate::model::{ModelConfiguration, SolverSettings};

use clap::Parser;
use log::*;

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::str::FromStr;

const MAX_GENERATION_ITERATIONS: usize = 100_000;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = CommandLineArguments::parse();

    match args.cmd {
        MainCommand::GenerateInstances { storage_name, seed, range } => {
            let space = range.parameter_space()?;
            let storage = generate_instances(&storage_name, seed, space, 0, HashSet::new())?;
            write_json(&storage_filename(&storage_name), &storage)?;
        }
        MainCommand::GenerateAdditionalInstances {
            storage_name,
            seed,
            previous_storages,
            range,
        } => {
            let space = range.parameter_space()?;
            let mut seen = HashSet::new();
            let mut index_offset = 0;
            for filename in previous_storages.iter() {
                let previous: InstanceStorage = read_json(filename)?;
                info!(
                    "read {} previous instances from {}",
                    previous.len(),
                    filename
                );
                if let Some(max_index) = previous.max_index() {
                    index_offset = index_offset.max(max_index + 1);
                }
                seen.extend(previous.representations());
            }
            let storage = generate_instances(&storage_name, seed, space, index_offset, seen)?;
            write_json(&storage_filename(&storage_name), &storage)?;
        }
        MainCommand::ExecuteExperiments {
            instance_storage,
            output_base_name,
            slice_to_execute,
            number_of_slices,
            decision_variant,
            strong_loop_freedom,
            flow_extension,
            timelimit,
            threads,
            mip_gap,
            solution_limit,
            numeric_focus,
        } => {
            if threads > num_cpus::get() {
                return Err(format!(
                    "thread parameter must lie in the interval [1, {}]",
                    num_cpus::get()
                )
                .into());
            }
            let settings = SolverSettings {
                time_limit: timelimit as f64,
                threads,
                mip_gap,
                solution_limit,
                numeric_focus,
            };
            let mut configurations = Vec::new();
            for decision in decision_variant.values() {
                for strong in strong_loop_freedom.values() {
                    for flow in flow_extension.values() {
                        configurations.push(ModelConfiguration {
                            decision_variant: decision,
                            strong_loop_freedom: strong,
                            use_flow_extension: flow,
                        });
                    }
                }
            }

            let instances: InstanceStorage = read_json(&instance_storage)?;
            info!("read instance storage {} ({} instances)", instances.identifier, instances.len());

            let mut executor = ExperimentExecutor::new(
                &instances,
                slice_to_execute,
                number_of_slices,
                configurations,
                settings,
            )?;
            executor.execute_all_instances()?;

            let filename = if slice_to_execute == 0 && number_of_slices == 1 {
                format!("{}.json", output_base_name)
            } else {
                format!("{}_{}_{}.json", output_base_name, slice_to_execute, number_of_slices)
            };
            write_json(&filename, executor.storage())?;
        }
        MainCommand::MergeExperimentStorages { output_filename, files } => {
            let mut result = ExperimentStorage::new("", None);
            for filename in files.iter() {
                let other: ExperimentStorage = read_json(filename)?;
                info!("merging {} ({} solutions)", filename, other.number_of_solutions());
                result.merge(other)?;
            }
            write_json(&output_filename, &result)?;
        }
        MainCommand::PrintResults { experiment_storage } => {
            let storage: ExperimentStorage = read_json(&experiment_storage)?;
            print_results(&storage);
        }
    }

    Ok(())
}

fn generate_instances(
    storage_name: &str,
    seed: u64,
    space: ParameterSpace,
    index_offset: usize,
    mut seen: HashSet<SequenceRepresentation>,
) -> Result<InstanceStorage, Box<dyn Error>> {
    info!("generating instances for {} with seed {} ({})", storage_name, seed, space);
    let mut storage = InstanceStorage::new(storage_name, space, seed);
    storage.generate(index_offset, &mut seen, MAX_GENERATION_ITERATIONS)?;
    Ok(storage)
}

fn print_results(storage: &ExperimentStorage) {
    println!("results of {}", storage.identifier);
    let mut last_index = None;
    for (index, configuration, extracted) in storage.extracted_solutions() {
        if last_index != Some(index) {
            println!("index: {}", index);
            last_index = Some(index);
        }
        println!(
            "    config: ({})  -->  class: {};  rounds: {};  wall clock: {:.2}s;  solver: {:.2}s",
            configuration,
            extracted.class,
            extracted
                .number_of_rounds
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            extracted.wall_time,
            extracted.solver_time,
        );
    }
}

fn storage_filename(storage_name: &str) -> String {
    format!("{}.json", storage_name)
}

fn write_json<T: serde::Serialize>(filename: &str, data: &T) -> Result<(), Box<dyn Error>> {
    let file = File::create(filename)?;
    serde_json::to_writer(BufWriter::new(file), data)?;
    info!("written {}", filename);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(filename: &str) -> Result<T, Box<dyn Error>> {
    let file = File::open(filename)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[derive(Parser, Debug)]
#[clap(name = "Netupdate", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Parser, Debug)]
enum MainCommand {
    /// Generate a new instance storage
    #[clap(name = "generate-instances")]
    GenerateInstances {
        /// Name of the storage (also used as output filename)
        storage_name: String,
        /// Seed of the random number stream
        seed: u64,
        /// Ranges of the parameter space
        #[clap(flatten)]
        range: ParameterRangeArguments,
    },
    /// Generate an instance storage extending previously generated ones, without repeating any
    /// of their instances
    #[clap(name = "generate-additional-instances")]
    GenerateAdditionalInstances {
        /// Name of the storage (also used as output filename)
        storage_name: String,
        /// Seed of the random number stream
        seed: u64,
        /// Previously generated instance storages (JSON)
        previous_storages: Vec<String>,
        /// Ranges of the parameter space
        #[clap(flatten)]
        range: ParameterRangeArguments,
    },
    /// Solve one slice of an instance storage under the selected model configurations
    #[clap(name = "execute-experiments")]
    ExecuteExperiments {
        /// Instance storage to solve (JSON)
        instance_storage: String,
        /// Base name of the output file
        output_base_name: String,
        /// The slice to execute (0-based)
        slice_to_execute: usize,
        /// Total number of slices
        number_of_slices: usize,
        /// Use the decision variant: yes, no or both
        decision_variant: Choice,
        /// Use strong loop freedom: yes, no or both
        strong_loop_freedom: Choice,
        /// Use the flow extension: yes, no or both
        flow_extension: Choice,
        /// Solver time limit in seconds
        #[clap(long, default_value = "600")]
        timelimit: u64,
        /// Number of solver threads
        #[clap(long, default_value = "1")]
        threads: usize,
        /// Relative MIP gap
        #[clap(long, default_value = "0.01")]
        mip_gap: f64,
        /// Stop each solve after this many feasible schedules
        #[clap(long)]
        solution_limit: Option<usize>,
        /// Numerical stability emphasis (0 to 3)
        #[clap(long, default_value = "0")]
        numeric_focus: u32,
    },
    /// Merge experiment storages produced by the slices of one batch
    #[clap(name = "merge-experiment-storages")]
    MergeExperimentStorages {
        /// Output filename of the merged storage
        output_filename: String,
        /// Experiment storages to merge (JSON)
        files: Vec<String>,
    },
    /// Print a summary of all results in an experiment storage
    #[clap(name = "print-results")]
    PrintResults {
        /// Experiment storage to print (JSON)
        experiment_storage: String,
    },
}

#[derive(Parser, Debug)]
struct ParameterRangeArguments {
    /// Smallest number of nodes
    #[clap(long, default_value = "10")]
    min_number_nodes: usize,
    /// Largest number of nodes
    #[clap(long, default_value = "30")]
    max_number_nodes: usize,
    /// Step between node counts
    #[clap(long, default_value = "1")]
    number_nodes_step: usize,
    /// Smallest number of waypoints
    #[clap(long, default_value = "1")]
    min_number_wps: usize,
    /// Largest number of waypoints
    #[clap(long, default_value = "3")]
    max_number_wps: usize,
    /// Step between waypoint counts
    #[clap(long, default_value = "1")]
    number_wps_step: usize,
    /// First repetition index
    #[clap(long, default_value = "0")]
    min_repetition_index: usize,
    /// Last repetition index (inclusive)
    #[clap(long, default_value = "100")]
    max_repetition_index: usize,
}

impl ParameterRangeArguments {
    fn parameter_space(&self) -> Result<ParameterSpace, Box<dyn Error>> {
        if self.number_nodes_step == 0 || self.number_wps_step == 0 {
            return Err("step sizes must be at least 1".into());
        }
        let number_of_nodes: Vec<usize> = (self.min_number_nodes..=self.max_number_nodes)
            .step_by(self.number_nodes_step)
            .collect();
        let number_of_waypoints: Vec<usize> = (self.min_number_wps..=self.max_number_wps)
            .step_by(self.number_wps_step)
            .collect();
        let repetitions: Vec<usize> =
            (self.min_repetition_index..=self.max_repetition_index).collect();

        if number_of_nodes.is_empty() {
            return Err("the node count range is empty".into());
        }
        if repetitions.is_empty() {
            return Err("the repetition index range is empty".into());
        }
        if number_of_waypoints.is_empty() {
            warn!("instances will be generated without any waypoints");
        }

        Ok(ParameterSpace { number_of_nodes, number_of_waypoints, repetitions })
    }
}

/// Three-valued selector used to run one or both settings of a configuration flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Yes,
    No,
    Both,
}

impl Choice {
    fn values(&self) -> Vec<bool> {
        match self {
            Self::Yes => vec![true],
            Self::No => vec![false],
            Self::Both => vec![true, false],
        }
    }
}

impl FromStr for Choice {
    type Err = ChoiceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "both" => Ok(Self::Both),
            _ => Err(ChoiceParseError(s.to_string())),
        }
    }
}

#[derive(Debug)]
struct ChoiceParseError(String);

impl fmt::Display for ChoiceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not one of 'yes', 'no' or 'both'", self.0)
    }
}

impl Error for ChoiceParseError {}
