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
//! Lifecycle of SDN controller platform instances: bootstrap and teardown.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use itertools::Itertools;
use thiserror::Error;

use crate::{
    config::OneOrMany,
    docker::{ContainerRuntime, ContainerSpec, RuntimeError},
};

/// Default feature set installed into an OpenDaylight instance.
const DEFAULT_ODL_FEATURES: [&str; 2] = [
    "odl-openflowplugin-southbound",
    "odl-openflowplugin-flow-services",
];

/// Default application set activated on an ONOS instance.
const DEFAULT_ONOS_APPS: &str = "openflow";

/// The karaf shell inside a fresh ODL instance needs a moment before its client accepts
/// feature commands.
const ODL_CLIENT_SETTLE: Duration = Duration::from_secs(5);

const ADDRESS_RETRIES: usize = 40;
const ADDRESS_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The supported SDN controller platforms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Odl,
    Onos,
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "odl" => Ok(Self::Odl),
            "onos" => Ok(Self::Onos),
            other => Err(PlatformError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Odl => write!(f, "odl"),
            Self::Onos => write!(f, "onos"),
        }
    }
}

impl Platform {
    pub fn default_release(&self) -> &'static str {
        match self {
            Self::Odl => "4.4.0",
            Self::Onos => "latest",
        }
    }

    /// The runtime image reference for this platform and release tag.
    pub fn image(&self, release: Option<&str>) -> String {
        let tag = release.unwrap_or_else(|| self.default_release());
        match self {
            Self::Odl => format!("opendaylight/odl:{tag}"),
            Self::Onos => format!("onosproject/onos:{tag}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unknown or unsupported SDN controller platform: {0}")]
    Unknown(String),
}

/// Error thrown when a controller platform cannot be brought up.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Ready,
    Stopped,
}

/// A running controller instance produced by [`PlatformManager::bootstrap`]. Owned exclusively
/// by the cycle that created it until teardown.
#[derive(Clone, Debug)]
pub struct PlatformInstance {
    pub id: String,
    pub address: String,
    pub platform: Platform,
    pub state: InstanceState,
}

pub struct PlatformManager<R> {
    runtime: Arc<R>,
}

impl<R: ContainerRuntime> PlatformManager<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    /// Bring up a controller instance for the given platform. Pulls the image if it is absent
    /// locally. Returns once the instance has an address assigned; internal feature loading
    /// inside the instance may still be in progress (the orchestrator applies the configured
    /// settle time on top).
    pub async fn bootstrap(
        &self,
        platform: &str,
        release: Option<&str>,
        apps: Option<&OneOrMany>,
    ) -> Result<PlatformInstance, BootstrapError> {
        let platform: Platform = platform.parse()?;
        let image = platform.image(release);

        if !self.runtime.image_exists(&image).await? {
            log::info!("Image {image} is not available locally");
            self.runtime.pull(&image).await?;
        }

        match platform {
            Platform::Odl => self.bootstrap_odl(&image, apps).await,
            Platform::Onos => self.bootstrap_onos(&image, apps).await,
        }
    }

    /// Bootstrap an OpenDaylight instance and install the requested features through the karaf
    /// client.
    async fn bootstrap_odl(
        &self,
        image: &str,
        apps: Option<&OneOrMany>,
    ) -> Result<PlatformInstance, BootstrapError> {
        let spec = ContainerSpec::new(image)
            .tty()
            .arg("/opt/opendaylight/bin/karaf");
        let id = self.runtime.start(&spec).await?;
        let mut instance = PlatformInstance {
            address: self.wait_for_address(&id).await?,
            id,
            platform: Platform::Odl,
            state: InstanceState::Starting,
        };

        tokio::time::sleep(ODL_CLIENT_SETTLE).await;
        let features = apps
            .map(|a| a.joined(" "))
            .unwrap_or_else(|| DEFAULT_ODL_FEATURES.iter().join(" "));
        self.runtime
            .exec(
                &instance.id,
                &format!("/opt/opendaylight/bin/client -u karaf \"feature:install {features}\""),
            )
            .await?;

        instance.state = InstanceState::Ready;
        Ok(instance)
    }

    /// Bootstrap an ONOS instance with the requested apps supplied through its environment.
    async fn bootstrap_onos(
        &self,
        image: &str,
        apps: Option<&OneOrMany>,
    ) -> Result<PlatformInstance, BootstrapError> {
        let onos_apps = apps
            .map(|a| a.joined(","))
            .unwrap_or_else(|| DEFAULT_ONOS_APPS.to_string());
        let spec = ContainerSpec::new(image).tty().env("ONOS_APPS", onos_apps);
        let id = self.runtime.start(&spec).await?;
        let mut instance = PlatformInstance {
            address: self.wait_for_address(&id).await?,
            id,
            platform: Platform::Onos,
            state: InstanceState::Starting,
        };

        let raw_active_apps = self.runtime.exec(&instance.id, "client \"apps -a -s\"").await?;
        // the first line is the client's own banner
        let active_apps = raw_active_apps.lines().skip(1).join("\n");
        log::info!("Following apps have been installed:\n{active_apps}");

        instance.state = InstanceState::Ready;
        Ok(instance)
    }

    /// Poll until the runtime reports an address for the instance.
    async fn wait_for_address(&self, id: &str) -> Result<String, RuntimeError> {
        let mut last = RuntimeError::NoAddress(id.to_string());
        for _ in 0..ADDRESS_RETRIES {
            match self.runtime.address(id).await {
                Ok(address) if !address.is_empty() => return Ok(address),
                Ok(_) => {}
                Err(e) => last = e,
            }
            tokio::time::sleep(ADDRESS_RETRY_DELAY).await;
        }
        Err(last)
    }

    /// Stop and remove a controller instance. Safe to call again on an already stopped
    /// instance; runtime failures are logged and reported to the caller, but a surrounding
    /// sweep must not abort on them.
    pub async fn teardown(&self, instance: &mut PlatformInstance) -> Result<(), RuntimeError> {
        if instance.state == InstanceState::Stopped {
            log::debug!("Controller instance {} is already stopped", instance.id);
            return Ok(());
        }

        let stopped = self.runtime.stop(&instance.id).await;
        if let Err(e) = &stopped {
            log::warn!("Could not stop controller instance {}: {e}", instance.id);
        }
        let removed = self.runtime.remove(&instance.id).await;
        if let Err(e) = &removed {
            log::warn!("Could not remove controller instance {}: {e}", instance.id);
        }

        instance.state = InstanceState::Stopped;
        stopped.and(removed)
    }
}
