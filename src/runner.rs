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
//! The orchestrator: repeated bootstrap → settle → execute → teardown cycles across a
//! repeat × argument × parallel-group matrix.

use std::{
    collections::VecDeque,
    fmt, fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    config::{ConfigError, RunConfig},
    docker::{ContainerRuntime, RuntimeError},
    link::{self, ContainerLinkControl, LinkState, NetworkControl, ScheduledAction},
    platform::{BootstrapError, PlatformInstance, PlatformManager},
    topology::Topology,
    util::PathBufExt,
    workload::{ExecutionError, RunResult, WorkloadExecutor},
};

/// Column titles of the per-cycle run records.
const RECORD_TITLE: [&str; 7] = [
    "timestamp",
    "group",
    "argument",
    "sequence",
    "success",
    "kind",
    "error",
];

/// States of one experiment cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Bootstrapping,
    Settling,
    Executing,
    TearingDown,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Settling => write!(f, "settling"),
            Self::Executing => write!(f, "executing"),
            Self::TearingDown => write!(f, "tearing-down"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Any failure that can end a single cycle. Caught at the cycle boundary and recorded; never
/// propagated out of the orchestrator task.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl CycleError {
    /// Coarse classification used in run records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bootstrap(BootstrapError::Platform(_)) => "platform",
            Self::Bootstrap(BootstrapError::Runtime(_)) => "bootstrap",
            Self::Execution(_) => "execution",
            Self::Runtime(_) => "runtime",
        }
    }
}

/// Captured failure of one orchestrator cycle, consumed by the owning caller through
/// [`RunnerHandle`].
#[derive(Debug)]
pub struct ExceptionRecord {
    pub group: usize,
    pub arg_index: Option<usize>,
    pub sequence: usize,
    pub error: CycleError,
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group {}, argument {}, run {}: {}",
            self.group,
            self.arg_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.sequence,
            self.error
        )
    }
}

type ExceptionQueue = Arc<Mutex<VecDeque<ExceptionRecord>>>;

/// One orchestrator instance, bound to a single parallel group.
pub struct ExperimentRunner<R> {
    config: RunConfig,
    runtime: Arc<R>,
    group: usize,
    errors: ExceptionQueue,
}

impl<R: ContainerRuntime + 'static> ExperimentRunner<R> {
    /// Validate the testcase and start one background orchestrator task per parallel group.
    /// Configuration errors are the only failures raised here; everything that goes wrong
    /// inside a cycle later ends up in the exception queue of the returned handle.
    pub fn start(config: RunConfig, runtime: Arc<R>) -> Result<RunnerHandle, ConfigError> {
        config.validate()?;

        if let Some(topo) = config.topology {
            let topo = Topology::from(topo);
            let graph = topo.build()?;
            let path = config.workspace.as_path().then("topology.json");
            fs::write(&path, serde_json::to_string_pretty(&graph)?)?;
            log::info!("Exported test topology {} to {}", topo.fmt(), path.display());
        }

        let errors: ExceptionQueue = Arc::new(Mutex::new(VecDeque::new()));
        let tasks = config
            .groups()
            .into_iter()
            .map(|group| {
                let runner = ExperimentRunner {
                    config: config.clone(),
                    runtime: runtime.clone(),
                    group,
                    errors: errors.clone(),
                };
                tokio::spawn(runner.run())
            })
            .collect();

        Ok(RunnerHandle { tasks, errors })
    }

    /// The sweep loop of one group: for every argument value, `repeat` cycles with a fresh
    /// sequence counter. A failed cycle is recorded and the loop moves on.
    async fn run(self) {
        let platforms = PlatformManager::new(self.runtime.clone());
        let executor = WorkloadExecutor::new(self.runtime.clone(), self.config.workspace.clone());

        let mut state = CycleState::Idle;
        for (arg_index, argument) in self.config.sweep() {
            for sequence in 1..=self.config.repeat {
                let cycle = self
                    .cycle(
                        &platforms,
                        &executor,
                        argument.as_deref(),
                        arg_index,
                        sequence,
                        &mut state,
                    )
                    .await;
                match cycle {
                    Ok(_) => {
                        self.enter(&mut state, CycleState::Idle);
                        self.append_record(arg_index, sequence, None);
                    }
                    Err(error) => {
                        self.enter(&mut state, CycleState::Failed);
                        log::error!(
                            "[group {}] cycle failed (argument {}, run {sequence}): {error}",
                            self.group,
                            arg_index
                                .map(|i| i.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                        );
                        log::debug!("[group {}] failure detail: {error:?}", self.group);
                        self.append_record(arg_index, sequence, Some(&error));
                        self.errors.lock().unwrap().push_back(ExceptionRecord {
                            group: self.group,
                            arg_index,
                            sequence,
                            error,
                        });
                        self.enter(&mut state, CycleState::Idle);
                    }
                }
            }
        }
        log::info!("[group {}] sweep finished", self.group);
    }

    /// One full cycle. Teardown always starts after the workload execution has returned, never
    /// concurrently with it.
    async fn cycle(
        &self,
        platforms: &PlatformManager<R>,
        executor: &WorkloadExecutor<R>,
        argument: Option<&str>,
        arg_index: Option<usize>,
        sequence: usize,
        state: &mut CycleState,
    ) -> Result<RunResult, CycleError> {
        self.enter(state, CycleState::Bootstrapping);
        log::info!("[group {}] Bootstrapping SDN platform...", self.group);
        let mut instance = platforms
            .bootstrap(
                &self.config.platform,
                self.config.release.as_deref(),
                self.config.apps.as_ref(),
            )
            .await?;
        log::info!(
            "[group {}] Bootstrapped SDN platform at {}",
            self.group,
            instance.address
        );

        self.enter(state, CycleState::Settling);
        log::info!(
            "[group {}] Waiting {} sec for mandatory components to load...",
            self.group,
            self.config.waiting
        );
        tokio::time::sleep(self.config.waiting()).await;

        self.enter(state, CycleState::Executing);
        let result = self
            .execute(executor, &instance, argument, arg_index, sequence)
            .await;

        self.enter(state, CycleState::TearingDown);
        let teardown = platforms.teardown(&mut instance).await;

        let run = result?;
        teardown?;
        Ok(run)
    }

    /// Run the workload, with the configured link failure-and-recovery pair scheduled
    /// concurrently against the same emulation instance. The scheduled actions are not awaited;
    /// their delays are chosen to elapse while the workload is still running.
    async fn execute(
        &self,
        executor: &WorkloadExecutor<R>,
        instance: &PlatformInstance,
        argument: Option<&str>,
        arg_index: Option<usize>,
        sequence: usize,
    ) -> Result<RunResult, CycleError> {
        let workflow = self
            .config
            .workflow
            .as_deref()
            .ok_or(ExecutionError::MissingWorkflow)?;
        let running = executor
            .begin(
                instance,
                workflow,
                argument,
                self.config.group_label(self.group),
                arg_index,
                sequence,
            )
            .await?;

        if let Some(failure) = &self.config.failure {
            let (src, dst) = self.config.failure_edge();
            let delay = Duration::from_secs(failure.after);
            let control: Arc<dyn NetworkControl> = Arc::new(ContainerLinkControl::new(
                self.runtime.clone(),
                running.id().to_string(),
            ));
            link::schedule(
                control.clone(),
                ScheduledAction {
                    src: src.clone(),
                    dst: dst.clone(),
                    state: LinkState::Down,
                    delay,
                },
            );
            link::schedule(
                control,
                ScheduledAction {
                    src,
                    dst,
                    state: LinkState::Up,
                    delay: delay * 2,
                },
            );
        }

        Ok(executor.finish(running).await?)
    }

    fn enter(&self, state: &mut CycleState, next: CycleState) {
        log::debug!("[group {}] cycle state: {state} -> {next}", self.group);
        *state = next;
    }

    fn csv_path(&self) -> PathBuf {
        let name = match self.config.group_label(self.group) {
            Some(group) => format!("runs.{group}.csv"),
            None => "runs.csv".to_string(),
        };
        self.config.output_dir().then(name)
    }

    /// Append one run record to the group's runs CSV. Recording failures must not end the
    /// sweep, so they are only logged.
    fn append_record(&self, arg_index: Option<usize>, sequence: usize, error: Option<&CycleError>) {
        let path = self.csv_path();
        let appended = (|| -> Result<(), Box<dyn std::error::Error>> {
            let new_file = !path.exists() || fs::metadata(&path)?.len() == 0;
            let mut csv = csv::Writer::from_writer(
                fs::OpenOptions::new().create(true).append(true).open(&path)?,
            );
            if new_file {
                csv.write_record(RECORD_TITLE)?;
            }
            csv.write_record([
                chrono::Local::now().format("%Y-%m-%d_%H:%M:%S").to_string(),
                self.group.to_string(),
                arg_index.map(|i| i.to_string()).unwrap_or_default(),
                sequence.to_string(),
                error.is_none().to_string(),
                error.map(|e| e.kind().to_string()).unwrap_or_default(),
                error.map(|e| e.to_string()).unwrap_or_default(),
            ])?;
            csv.flush()?;
            Ok(())
        })();
        if let Err(e) = appended {
            log::warn!("Could not append run record to {}: {e}", path.display());
        }
    }
}

/// Handle to a started experiment. The experiment itself runs in background tasks; the
/// exception queue can be inspected at any time, including after the tasks have finished.
pub struct RunnerHandle {
    tasks: Vec<JoinHandle<()>>,
    errors: ExceptionQueue,
}

impl RunnerHandle {
    /// Number of exception records collected so far. Non-blocking.
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    /// Drain all exception records collected so far, in the order the failures occurred.
    /// Non-blocking; may be called while the experiment is still running.
    pub fn drain_errors(&self) -> Vec<ExceptionRecord> {
        self.errors.lock().unwrap().drain(..).collect()
    }

    /// Wait for all orchestrator groups to finish and drain the remaining records.
    pub async fn join(mut self) -> Vec<ExceptionRecord> {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::error!("Orchestrator task panicked: {e}");
            }
        }
        self.drain_errors()
    }
}
