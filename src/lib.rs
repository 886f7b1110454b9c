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
//! Library for running repeated resilience experiments against SDN controller platforms.

pub mod config;
pub mod docker;
pub mod link;
pub mod platform;
pub mod runner;
pub mod topology;
pub mod util;
pub mod workload;

pub mod prelude {
    pub use super::{
        config::{ConfigError, RunConfig},
        docker::{ContainerRuntime, ContainerSpec, DockerCli, RuntimeError},
        link::{LinkState, NetworkControl, ScheduledAction},
        platform::{Platform, PlatformError, PlatformInstance, PlatformManager},
        runner::{ExceptionRecord, ExperimentRunner, RunnerHandle},
        topology::{Graph, Topology},
        workload::{RunResult, WorkloadExecutor},
    };
}
