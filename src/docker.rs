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
//! Boundary to the container runtime that hosts controller and emulation instances.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Errors reported by the container runtime backend.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Cannot invoke the container runtime: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Container runtime command failed ({command}): {stderr}")]
    Command { command: String, stderr: String },
    #[error("Container {0} has no address assigned")]
    NoAddress(String),
}

/// Description of a container instance to start.
#[derive(Clone, Debug, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Host path to container path bind mounts.
    pub volumes: Vec<(PathBuf, String)>,
    pub cap_add: Vec<String>,
    pub privileged: bool,
    pub tty: bool,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    pub fn cap(mut self, cap: impl Into<String>) -> Self {
        self.cap_add.push(cap.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn tty(mut self) -> Self {
        self.tty = true;
        self
    }
}

/// The operations the orchestration engine needs from a container backend. Implemented by
/// [`DockerCli`] for production use; tests substitute recording stubs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the image is available locally.
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;
    /// Pull an image from the registry. May take arbitrarily long.
    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;
    /// Start a detached container and return its identifier.
    async fn start(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;
    /// Execute a command inside a running container and capture its stdout.
    async fn exec(&self, id: &str, command: &str) -> Result<String, RuntimeError>;
    /// The network address assigned to a running container (empty if none yet).
    async fn address(&self, id: &str) -> Result<String, RuntimeError>;
    /// Block until the container terminates and return its exit status.
    async fn wait(&self, id: &str) -> Result<i64, RuntimeError>;
    /// The captured stdout of a container.
    async fn logs(&self, id: &str) -> Result<String, RuntimeError>;
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;
    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;
}

/// Adapter driving the local `docker` CLI.
#[derive(Clone, Debug)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let output = Command::new(&self.binary).args(args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(RuntimeError::Command {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn run_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        if spec.tty {
            args.push("-t".to_string());
        }
        if spec.privileged {
            args.push("--privileged".to_string());
        }
        for cap in &spec.cap_add {
            args.push("--cap-add".to_string());
            args.push(cap.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in &spec.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), container));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(!self.docker(&["images", "-q", image]).await?.is_empty())
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        log::info!("Pulling image {image}... (this may take a while)");
        let output = self.docker(&["pull", image]).await?;
        log::debug!("{output}");
        Ok(())
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let args = Self::run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&args).await
    }

    async fn exec(&self, id: &str, command: &str) -> Result<String, RuntimeError> {
        self.docker(&["exec", id, "sh", "-c", command]).await
    }

    async fn address(&self, id: &str) -> Result<String, RuntimeError> {
        self.docker(&["inspect", "-f", "{{.NetworkSettings.IPAddress}}", id])
            .await
    }

    async fn wait(&self, id: &str) -> Result<i64, RuntimeError> {
        let status = self.docker(&["wait", id]).await?;
        status.parse().map_err(|_| RuntimeError::Command {
            command: format!("{} wait {id}", self.binary),
            stderr: format!("unexpected exit status {status:?}"),
        })
    }

    async fn logs(&self, id: &str) -> Result<String, RuntimeError> {
        self.docker(&["logs", id]).await
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker(&["stop", id]).await.map(|_| ())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker(&["rm", id]).await.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::{
        collections::HashSet,
        sync::Mutex,
    };

    use super::*;

    /// Recording in-memory container runtime shared by the crate's tests.
    pub(crate) struct StubRuntime {
        calls: Mutex<Vec<String>>,
        missing_images: Mutex<HashSet<String>>,
        /// 1-based index of the workload start that fails, if any.
        fail_workload_start: Option<usize>,
        workload_starts: Mutex<usize>,
        next_id: Mutex<usize>,
    }

    impl StubRuntime {
        pub(crate) fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                missing_images: Mutex::new(HashSet::new()),
                fail_workload_start: None,
                workload_starts: Mutex::new(0),
                next_id: Mutex::new(0),
            }
        }

        /// A runtime whose `n`-th workload start fails.
        pub(crate) fn failing_workload(n: usize) -> Self {
            Self {
                fail_workload_start: Some(n),
                ..Self::new()
            }
        }

        pub(crate) fn with_missing_image(self, image: &str) -> Self {
            self.missing_images.lock().unwrap().insert(image.to_string());
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
            Ok(!self.missing_images.lock().unwrap().contains(image))
        }

        async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
            self.record(format!("pull {image}"));
            self.missing_images.lock().unwrap().remove(image);
            Ok(())
        }

        async fn start(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
            let mut call = format!("start {}", spec.image);
            for (key, value) in &spec.env {
                call.push_str(&format!(" {key}={value}"));
            }
            for arg in &spec.command {
                call.push_str(&format!(" {arg}"));
            }
            self.record(call);

            if spec.image == crate::workload::WORKLOAD_IMAGE {
                let mut starts = self.workload_starts.lock().unwrap();
                *starts += 1;
                if Some(*starts) == self.fail_workload_start {
                    return Err(RuntimeError::Command {
                        command: "docker run".to_string(),
                        stderr: "workload runtime unavailable".to_string(),
                    });
                }
            }

            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            Ok(format!("c{next_id}"))
        }

        async fn exec(&self, id: &str, command: &str) -> Result<String, RuntimeError> {
            self.record(format!("exec {id} {command}"));
            Ok(String::new())
        }

        async fn address(&self, _id: &str) -> Result<String, RuntimeError> {
            Ok("172.17.0.2".to_string())
        }

        async fn wait(&self, _id: &str) -> Result<i64, RuntimeError> {
            Ok(0)
        }

        async fn logs(&self, id: &str) -> Result<String, RuntimeError> {
            Ok(format!("captured output of {id}"))
        }

        async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
            self.record(format!("stop {id}"));
            Ok(())
        }

        async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
            self.record(format!("remove {id}"));
            Ok(())
        }
    }
}
