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
//! Scheduled one-shot link state changes, used to emulate a failure-and-recovery event while a
//! workload runs.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::docker::{ContainerRuntime, RuntimeError};

/// Desired state of an emulated link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// A one-shot future change of a link's state. Immutable once created; fires exactly once.
#[derive(Clone, Debug)]
pub struct ScheduledAction {
    pub src: String,
    pub dst: String,
    pub state: LinkState,
    pub delay: Duration,
}

/// Handle through which link state changes reach the emulated network. The implementation is
/// expected to serialize state changes per edge.
#[async_trait]
pub trait NetworkControl: Send + Sync {
    async fn set_link(&self, src: &str, dst: &str, state: LinkState) -> Result<(), RuntimeError>;
}

/// Fire `action` once after its delay has elapsed. The spawned task owns the action, applies
/// the single state change and terminates; the caller does not need to await the returned
/// handle. Timing is best effort (subject to scheduler jitter).
pub fn schedule(handle: Arc<dyn NetworkControl>, action: ScheduledAction) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "Scheduled: set link ({}, {}) {} after {:.2} sec",
            action.src,
            action.dst,
            action.state,
            action.delay.as_secs_f64()
        );
        tokio::time::sleep(action.delay).await;
        log::info!("Link ({}, {}) {}", action.src, action.dst, action.state);
        if let Err(e) = handle
            .set_link(&action.src, &action.dst, action.state)
            .await
        {
            log::warn!(
                "Could not set link ({}, {}) {}: {e}",
                action.src,
                action.dst,
                action.state
            );
        }
    })
}

/// Link control that execs the emulation image's `linkctl` helper inside the running workload
/// container.
pub struct ContainerLinkControl<R> {
    runtime: Arc<R>,
    container: String,
}

impl<R> ContainerLinkControl<R> {
    pub fn new(runtime: Arc<R>, container: String) -> Self {
        Self { runtime, container }
    }
}

#[async_trait]
impl<R: ContainerRuntime> NetworkControl for ContainerLinkControl<R> {
    async fn set_link(&self, src: &str, dst: &str, state: LinkState) -> Result<(), RuntimeError> {
        self.runtime
            .exec(&self.container, &format!("linkctl {src} {dst} {state}"))
            .await
            .map(|_| ())
    }
}
