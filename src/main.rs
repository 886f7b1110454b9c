// sdnbench: Automated Resilience Experiments for SDN Controller Platforms
// Copyright (C) 2024-2025 The sdnbench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use sdnbench::{config::RunConfig, docker::DockerCli, runner::ExperimentRunner, util};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Path to the testcase configuration file.
    testcase: PathBuf,
    /// Overwrite the workspace directory from the testcase.
    #[arg(short, long)]
    workspace: Option<PathBuf>,
    /// Overwrite the number of repetitions per argument value.
    #[arg(short, long)]
    repeat: Option<usize>,
    /// Overwrite the number of parallel orchestrator groups.
    #[arg(short, long)]
    parallel: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();

    let args = Args::parse();
    let mut config = RunConfig::from_file(&args.testcase)?;
    if let Some(workspace) = args.workspace {
        config.workspace = workspace;
    }
    if let Some(repeat) = args.repeat {
        config.repeat = repeat;
    }
    if let Some(parallel) = args.parallel {
        config.parallel = parallel;
    }

    let handle = ExperimentRunner::start(config, Arc::new(DockerCli::new()))?;
    let errors = handle.join().await;

    if !errors.is_empty() {
        log::error!("{} cycle(s) failed:", errors.len());
        for record in &errors {
            log::error!("  {record}");
        }
        std::process::exit(1);
    }
    Ok(())
}
