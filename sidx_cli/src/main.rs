/*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

mod commands;
mod ingest;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sidx", about = "Build and compare 3-D spatial indexes over neuroscience datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index over morphology segments read from a circuit-config fixture.
    IndexSegments {
        circuit_config: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long)]
        multi_index: bool,
        #[arg(long = "population", value_name = "NAME")]
        populations: Vec<String>,
    },
    /// Build an index over synapses read from an edges-file fixture.
    IndexSynapses {
        edges_file: PathBuf,
        population: Option<String>,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long)]
        multi_index: bool,
    },
    /// Compare two index directories for query-result equivalence.
    IndexCompare {
        index_a: PathBuf,
        index_b: PathBuf,
    },
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::IndexSegments {
            circuit_config,
            out,
            multi_index,
            populations,
        } => {
            if !circuit_config.exists() {
                log::error!("circuit config not found: {}", circuit_config.display());
                return ExitCode::from(1);
            }
            match commands::index_segments(&circuit_config, &out, multi_index, &populations) {
                Ok(()) => {
                    log::info!("wrote index to {}", out.display());
                    ExitCode::from(0)
                }
                Err(e) => {
                    log::error!("build failed: {}", e);
                    ExitCode::from(2)
                }
            }
        }
        Command::IndexSynapses {
            edges_file,
            population,
            out,
            multi_index,
        } => {
            if !edges_file.exists() {
                log::error!("edges file not found: {}", edges_file.display());
                return ExitCode::from(1);
            }
            if let Some(name) = &population {
                log::info!("treating edges file as population '{}'", name);
            }
            match commands::index_synapses(&edges_file, &out, multi_index, population.as_deref())
            {
                Ok(()) => {
                    log::info!("wrote index to {}", out.display());
                    ExitCode::from(0)
                }
                Err(e) => {
                    log::error!("build failed: {}", e);
                    ExitCode::from(2)
                }
            }
        }
        Command::IndexCompare { index_a, index_b } => {
            if !index_a.exists() || !index_b.exists() {
                log::error!("both index directories must exist");
                return ExitCode::from(1);
            }
            match commands::index_compare(&index_a, &index_b) {
                Ok(true) => {
                    log::info!("indexes are equivalent");
                    ExitCode::from(0)
                }
                Ok(false) => {
                    log::warn!("indexes diverge on at least one sampled query");
                    ExitCode::from(3)
                }
                Err(e) => {
                    log::error!("comparison failed: {}", e);
                    ExitCode::from(1)
                }
            }
        }
    }
}
