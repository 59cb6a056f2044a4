use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{Action, ActionError};

/// Camera names mapped to controller hostnames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CameraDirectory {
    #[serde(default)]
    pub cameras: BTreeMap<String, String>,
}

impl CameraDirectory {
    /// Parses a TOML document of the form `[cameras]\n"Organ Loft" = "controller-2"`.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse camera directory")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid camera file {}", path.display()))
    }

    pub fn hostname(&self, camera: &str) -> Option<&str> {
        self.cameras.get(camera.trim()).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPower {
    On,
    Off,
}

impl CameraPower {
    fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Switches a named camera via its controller's HTTP API.
#[derive(Debug, Clone)]
pub struct CameraAction {
    http: reqwest::Client,
    directory: CameraDirectory,
    power: CameraPower,
}

impl CameraAction {
    pub fn new(directory: CameraDirectory, power: CameraPower, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .context("failed to create camera client")?;
        Ok(Self {
            http,
            directory,
            power,
        })
    }
}

#[async_trait]
impl Action for CameraAction {
    async fn run(&self, parameter: &str, _cancel: &CancellationToken) -> Result<String, ActionError> {
        let camera = parameter.trim();
        let hostname = self
            .directory
            .hostname(camera)
            .ok_or_else(|| ActionError::UnknownCamera(camera.to_string()))?;
        let state = self.power.as_str();
        let response = self
            .http
            .post(format!("http://{hostname}/api/{state}"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ActionError::Rejected {
                target: format!("camera {camera}"),
                status: response.status().as_u16(),
            });
        }
        info!(camera, state, "camera switched");
        Ok(format!("Camera {camera} is {state}"))
    }
}
