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
//! Execution of the emulation workload against a running controller instance.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    docker::{ContainerRuntime, ContainerSpec, RuntimeError},
    platform::PlatformInstance,
    util::PathBufExt,
};

/// Runtime image used to execute emulation workloads.
pub(crate) const WORKLOAD_IMAGE: &str = "ciena/mininet";

/// Mount point of the experiment workspace inside the workload container.
const EXPERIMENT_MOUNT: &str = "/experiment";

/// Error thrown when the workload cannot be started, run, or its output persisted.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("No workflow is configured for this testcase")]
    MissingWorkflow,
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Cannot persist the captured workload output: {0}")]
    Persist(#[from] std::io::Error),
}

/// Captured result of a single workload execution. Written once, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub group: Option<usize>,
    pub arg_index: Option<usize>,
    pub sequence: usize,
    pub output: String,
}

impl RunResult {
    /// File name encoding group, argument index and sequence number, so that concurrent groups
    /// and sweep values never collide on output paths.
    pub fn file_name(&self) -> String {
        let mut name = String::from("output");
        if let Some(group) = self.group {
            name.push_str(&format!(".{group}"));
        }
        if let Some(arg_index) = self.arg_index {
            name.push_str(&format!(".{arg_index}"));
        }
        name.push_str(&format!("-{}.log", self.sequence));
        name
    }
}

/// A workload container that has been started and not yet waited for.
pub struct RunningWorkload {
    id: String,
    group: Option<usize>,
    arg_index: Option<usize>,
    sequence: usize,
}

impl RunningWorkload {
    pub fn id(&self) -> &str {
        &self.id
    }
}

pub struct WorkloadExecutor<R> {
    runtime: Arc<R>,
    workspace: PathBuf,
}

impl<R: ContainerRuntime> WorkloadExecutor<R> {
    pub fn new(runtime: Arc<R>, workspace: PathBuf) -> Self {
        Self { runtime, workspace }
    }

    /// Start the workload container. The workflow script is resolved under the workspace mount
    /// and receives the controller address plus the current sweep argument.
    pub async fn begin(
        &self,
        instance: &PlatformInstance,
        workflow: &Path,
        argument: Option<&str>,
        group: Option<usize>,
        arg_index: Option<usize>,
        sequence: usize,
    ) -> Result<RunningWorkload, ExecutionError> {
        let command = Path::new(EXPERIMENT_MOUNT).then(workflow);
        let mut spec = ContainerSpec::new(WORKLOAD_IMAGE)
            .privileged()
            .tty()
            .cap("NET_ADMIN")
            .cap("SYS_MODULE")
            .volume("/lib/modules", "/lib/modules")
            .volume(self.workspace.clone(), EXPERIMENT_MOUNT)
            .arg(command.display().to_string())
            .arg(instance.address.as_str());
        if let Some(argument) = argument {
            spec = spec.arg(argument);
        }

        log::info!(
            "Executing workload {} against {}",
            workflow.display(),
            instance.address
        );
        let id = self.runtime.start(&spec).await?;
        Ok(RunningWorkload {
            id,
            group,
            arg_index,
            sequence,
        })
    }

    /// Block until the workload terminates, capture its full stdout and persist it under the
    /// workspace's output directory.
    pub async fn finish(&self, running: RunningWorkload) -> Result<RunResult, ExecutionError> {
        let status = self.runtime.wait(&running.id).await?;
        let output = self.runtime.logs(&running.id).await?;
        if let Err(e) = self.runtime.remove(&running.id).await {
            log::warn!("Could not remove workload container {}: {e}", running.id);
        }
        if status != 0 {
            log::warn!("Workload exited with status {status}");
        }

        let result = RunResult {
            group: running.group,
            arg_index: running.arg_index,
            sequence: running.sequence,
            output,
        };
        let path = self.workspace.as_path().then("output").then(result.file_name());
        fs::write(&path, &result.output)?;
        log::debug!("Captured workload output to {}", path.display());
        Ok(result)
    }

    /// Run the workload to completion. Blocks the calling cycle until it terminates.
    pub async fn execute(
        &self,
        instance: &PlatformInstance,
        workflow: &Path,
        argument: Option<&str>,
        group: Option<usize>,
        arg_index: Option<usize>,
        sequence: usize,
    ) -> Result<RunResult, ExecutionError> {
        let running = self
            .begin(instance, workflow, argument, group, arg_index, sequence)
            .await?;
        self.finish(running).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        docker::stub::StubRuntime,
        platform::{InstanceState, Platform},
    };

    fn result(group: Option<usize>, arg_index: Option<usize>, sequence: usize) -> RunResult {
        RunResult {
            group,
            arg_index,
            sequence,
            output: String::new(),
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(result(None, None, 1).file_name(), "output-1.log");
        assert_eq!(result(None, Some(2), 1).file_name(), "output.2-1.log");
        assert_eq!(result(Some(3), None, 2).file_name(), "output.3-2.log");
        assert_eq!(result(Some(3), Some(2), 4).file_name(), "output.3.2-4.log");
    }

    #[test]
    fn test_file_names_unique_across_matrix() {
        let mut names: Vec<String> = Vec::new();
        for group in [Some(1), Some(2)] {
            for arg_index in [Some(1), Some(2), Some(3)] {
                for sequence in 1..=3 {
                    names.push(result(group, arg_index, sequence).file_name());
                }
            }
        }
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[tokio::test]
    async fn test_execute_captures_and_persists() {
        let ws = tempfile::tempdir().unwrap();
        fs::create_dir(ws.path().join("output")).unwrap();
        let runtime = Arc::new(StubRuntime::new());
        let executor = WorkloadExecutor::new(runtime.clone(), ws.path().to_path_buf());
        let instance = PlatformInstance {
            id: "ctrl".to_string(),
            address: "172.17.0.2".to_string(),
            platform: Platform::Odl,
            state: InstanceState::Ready,
        };

        let result = executor
            .execute(&instance, Path::new("ping.sh"), Some("10"), None, Some(1), 1)
            .await
            .unwrap();

        assert_eq!(result.sequence, 1);
        assert!(!result.output.is_empty());
        let persisted = fs::read_to_string(ws.path().join("output").join("output.1-1.log")).unwrap();
        assert_eq!(persisted, result.output);

        // the workload container received the controller address and the argument
        let calls = runtime.calls();
        assert!(calls[0].starts_with(&format!("start {WORKLOAD_IMAGE}")));
        assert!(calls[0].contains("/experiment/ping.sh 172.17.0.2 10"));
        // and was cleaned up afterwards
        assert!(calls.iter().any(|c| c.starts_with("remove ")));
    }

    #[tokio::test]
    async fn test_start_failure_is_execution_error() {
        let ws = tempfile::tempdir().unwrap();
        fs::create_dir(ws.path().join("output")).unwrap();
        let runtime = Arc::new(StubRuntime::failing_workload(1));
        let executor = WorkloadExecutor::new(runtime, ws.path().to_path_buf());
        let instance = PlatformInstance {
            id: "ctrl".to_string(),
            address: "172.17.0.2".to_string(),
            platform: Platform::Odl,
            state: InstanceState::Ready,
        };

        let result = executor
            .execute(&instance, Path::new("ping.sh"), None, None, None, 1)
            .await;
        assert!(matches!(result, Err(ExecutionError::Runtime(_))));
        assert!(fs::read_dir(ws.path().join("output")).unwrap().next().is_none());
    }
}
