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
//! Testcase configuration: a typed, validated description of one experiment sweep.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    platform::{Platform, PlatformError},
    topology::Topology,
    util::PathBufExt,
};

/// A configuration value that may be given as a scalar or as an ordered list.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Join all values into a single string with the given separator.
    pub fn joined(&self, sep: &str) -> String {
        match self {
            Self::One(v) => v.clone(),
            Self::Many(vs) => vs.iter().join(sep),
        }
    }
}

/// Parameters of the generated test topology.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct TopologyConfig {
    pub branches: usize,
    pub hops: usize,
}

/// A link failure-and-recovery event injected while the workload runs: the link goes down
/// `after` seconds into the run and comes back up after twice that time.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FailureConfig {
    /// Target edge. Defaults to the core ring edge of the generated topology.
    #[serde(default)]
    pub link: Option<(String, String)>,
    /// Seconds between workload start and the link going down.
    pub after: u64,
}

fn default_platform() -> String {
    "odl".to_string()
}

fn default_waiting() -> u64 {
    15
}

fn default_parallel() -> usize {
    1
}

fn default_group() -> usize {
    1
}

/// Options of one testcase, loaded from a JSON file. Immutable once [`RunConfig::validate`]
/// has accepted it.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Experiment workspace directory. Captured outputs go to `{workspace}/output/`.
    #[serde(default)]
    pub workspace: PathBuf,
    /// Number of cycles to run per argument value.
    #[serde(default)]
    pub repeat: usize,
    /// SDN controller platform to test against.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Overrides the default release tag of the platform image.
    #[serde(default)]
    pub release: Option<String>,
    /// Overrides the default feature/app set of the platform.
    #[serde(default)]
    pub apps: Option<OneOrMany>,
    /// Settle time (seconds) between platform bootstrap and workload execution.
    #[serde(default = "default_waiting")]
    pub waiting: u64,
    /// Workload script, resolved relative to the workspace.
    #[serde(default)]
    pub workflow: Option<PathBuf>,
    /// Argument value(s) passed to the workload. A list is swept in order.
    #[serde(default)]
    pub arguments: Option<OneOrMany>,
    /// Number of orchestrator groups running this testcase concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Index of the first group, used to disambiguate output files.
    #[serde(default = "default_group")]
    pub group: usize,
    /// Test topology exported for workflow scripts.
    #[serde(default)]
    pub topology: Option<TopologyConfig>,
    /// Mid-run link failure and recovery event.
    #[serde(default)]
    pub failure: Option<FailureConfig>,
}

impl RunConfig {
    /// Load a testcase configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check the testcase once, before any cycle starts. Creates `{workspace}/output/` if it
    /// does not exist yet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.as_os_str().is_empty() {
            return Err(ConfigError::MissingWorkspace);
        }
        if !self.workspace.is_dir() {
            return Err(ConfigError::BadWorkspace(self.workspace.clone()));
        }
        let output = self.output_dir();
        if output.exists() {
            if !output.is_dir() {
                return Err(ConfigError::OutputConflict(self.workspace.clone()));
            }
        } else {
            fs::create_dir(&output)?;
        }
        self.platform.parse::<Platform>()?;
        if let Some(topo) = self.topology {
            Topology::from(topo).build()?;
        }
        Ok(())
    }

    /// Directory receiving the captured workload outputs.
    pub fn output_dir(&self) -> PathBuf {
        self.workspace.as_path().then("output")
    }

    pub fn waiting(&self) -> Duration {
        Duration::from_secs(self.waiting)
    }

    /// The ordered argument sweep. A scalar argument is a one-element sweep; the index is only
    /// assigned when the testcase gives a list of values.
    pub fn sweep(&self) -> Vec<(Option<usize>, Option<String>)> {
        match &self.arguments {
            None => vec![(None, None)],
            Some(OneOrMany::One(v)) => vec![(None, Some(v.clone()))],
            Some(OneOrMany::Many(vs)) => vs
                .iter()
                .enumerate()
                .map(|(i, v)| (Some(i + 1), Some(v.clone())))
                .collect(),
        }
    }

    /// The group indices to run, starting at `group`.
    pub fn groups(&self) -> Vec<usize> {
        (self.group..self.group + self.parallel.max(1)).collect()
    }

    /// The group index as it appears in output file names: present only when more than one
    /// group runs concurrently.
    pub fn group_label(&self, group: usize) -> Option<usize> {
        (self.parallel > 1).then_some(group)
    }

    /// The edge targeted by the configured failure event.
    pub fn failure_edge(&self) -> (String, String) {
        self.failure
            .as_ref()
            .and_then(|f| f.link.clone())
            .unwrap_or_else(|| {
                self.topology
                    .map(Topology::from)
                    .unwrap_or_default()
                    .core_edge()
            })
    }
}

impl From<TopologyConfig> for Topology {
    fn from(config: TopologyConfig) -> Self {
        Topology::TriangleStar {
            branches: config.branches,
            hops: config.hops,
        }
    }
}

/// Error thrown when the testcase configuration is invalid or missing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read the testcase configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse the testcase configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Missing workspace. Set an experiment workspace directory to run the testcase.")]
    MissingWorkspace,
    #[error("Workspace {0} is non-existent or not a directory")]
    BadWorkspace(PathBuf),
    #[error("'output' in workspace {0} already exists, but is not a directory")]
    OutputConflict(PathBuf),
    #[error("Invalid topology: every core switch needs at least one branch (got {branches})")]
    InvalidTopology { branches: usize },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(raw: &str) -> RunConfig {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(r#"{"workspace": "/tmp/ws"}"#);
        assert_eq!(config.repeat, 0);
        assert_eq!(config.platform, "odl");
        assert_eq!(config.release, None);
        assert_eq!(config.apps, None);
        assert_eq!(config.waiting, 15);
        assert_eq!(config.parallel, 1);
        assert_eq!(config.group, 1);
        assert_eq!(config.groups(), vec![1]);
        assert_eq!(config.group_label(1), None);
    }

    #[test]
    fn test_scalar_or_list() {
        let config = parse(r#"{"workspace": "/tmp/ws", "apps": "openflow", "arguments": "10"}"#);
        assert_eq!(config.apps, Some(OneOrMany::One("openflow".to_string())));
        assert_eq!(config.sweep(), vec![(None, Some("10".to_string()))]);

        let config = parse(
            r#"{"workspace": "/tmp/ws", "apps": ["a", "b"], "arguments": ["10", "20", "30"]}"#,
        );
        assert_eq!(config.apps.as_ref().unwrap().joined(" "), "a b");
        assert_eq!(
            config.sweep(),
            vec![
                (Some(1), Some("10".to_string())),
                (Some(2), Some("20".to_string())),
                (Some(3), Some("30".to_string())),
            ]
        );
    }

    #[test]
    fn test_no_arguments_is_single_sweep() {
        let config = parse(r#"{"workspace": "/tmp/ws"}"#);
        assert_eq!(config.sweep(), vec![(None, None)]);
    }

    #[test]
    fn test_parallel_groups() {
        let config = parse(r#"{"workspace": "/tmp/ws", "parallel": 3, "group": 2}"#);
        assert_eq!(config.groups(), vec![2, 3, 4]);
        assert_eq!(config.group_label(3), Some(3));
    }

    #[test]
    fn test_missing_workspace() {
        let config = parse("{}");
        assert!(matches!(config.validate(), Err(ConfigError::MissingWorkspace)));
    }

    #[test]
    fn test_bad_workspace() {
        let config = parse(r#"{"workspace": "/nonexistent/sdnbench/ws"}"#);
        assert!(matches!(config.validate(), Err(ConfigError::BadWorkspace(_))));
    }

    #[test]
    fn test_output_conflict() {
        let ws = tempfile::tempdir().unwrap();
        fs::write(ws.path().join("output"), "not a directory").unwrap();
        let config = parse(&format!(r#"{{"workspace": {:?}}}"#, ws.path()));
        assert!(matches!(config.validate(), Err(ConfigError::OutputConflict(_))));
    }

    #[test]
    fn test_output_dir_created() {
        let ws = tempfile::tempdir().unwrap();
        let config = parse(&format!(r#"{{"workspace": {:?}}}"#, ws.path()));
        config.validate().unwrap();
        assert!(ws.path().join("output").is_dir());
        // validating again against the existing directory is fine
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_platform() {
        let ws = tempfile::tempdir().unwrap();
        let config = parse(&format!(
            r#"{{"workspace": {:?}, "platform": "floodlight"}}"#,
            ws.path()
        ));
        assert!(matches!(config.validate(), Err(ConfigError::Platform(_))));
    }

    #[test]
    fn test_invalid_topology() {
        let ws = tempfile::tempdir().unwrap();
        let config = parse(&format!(
            r#"{{"workspace": {:?}, "topology": {{"branches": 0, "hops": 2}}}}"#,
            ws.path()
        ));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTopology { branches: 0 })
        ));
    }

    #[test]
    fn test_failure_edge() {
        let config = parse(r#"{"workspace": "/tmp/ws", "failure": {"after": 5}}"#);
        assert_eq!(config.failure.as_ref().unwrap().after, 5);
        assert_eq!(
            config.failure_edge(),
            ("core0".to_string(), "core1".to_string())
        );

        let config = parse(
            r#"{"workspace": "/tmp/ws", "failure": {"link": ["core1", "core2"], "after": 5}}"#,
        );
        assert_eq!(
            config.failure_edge(),
            ("core1".to_string(), "core2".to_string())
        );
    }
}
