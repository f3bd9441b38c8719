/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the agent connects when nothing else is configured
const DEFAULT_SERVER_URL: &str = "ssl://dev.goodsop.cn:8883";
const DEFAULT_ENV: &str = "dev";
const DEFAULT_DEVICE_MODEL: &str = "RK3562";
const DEFAULT_STORE_PATH: &str = "/var/lib/devlink/device.json";

/// Describes the format of the device link agent configuration file.
///
/// This is what we READ from /etc/devlink/config.toml. Every field has a
/// default, so an empty file (or no file at all) is a valid configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAgentConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

impl LinkAgentConfig {
    /// Loads the agent configuration file in toml format from the given path
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let data = std::fs::read_to_string(path)?;

        toml::from_str(&data).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid LinkAgentConfig toml data: {e}"),
            )
        })
    }
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkConfig {
    /// `ssl://`, `mqtts://` or `tls://` select TLS; `tcp://` and `mqtt://` don't.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,
    #[serde(default = "default_true")]
    pub automatic_reconnect: bool,
    #[serde(default)]
    pub clean_session: bool,
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_device_model")]
    pub device_model: String,
    /// PEM CA bundle for TLS. Platform roots are used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Capacity of the MQTT client's outgoing request queue
    #[serde(default = "default_request_channel_capacity")]
    pub request_channel_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            connection_timeout_secs: default_connection_timeout_secs(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
            automatic_reconnect: true,
            clean_session: false,
            env: default_env(),
            device_model: default_device_model(),
            ca_file: None,
            request_channel_capacity: default_request_channel_capacity(),
        }
    }
}

impl LinkConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }
}

/// Status reporting schedule.
///
/// Durations are humantime strings ("5m", "90s") so the unit is always
/// spelled out in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// How long the startup report waits for the link to become ready
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,
    /// How long each heartbeat waits for the link before skipping the tick
    #[serde(default = "default_heartbeat_ready_timeout", with = "humantime_serde")]
    pub heartbeat_ready_timeout: Duration,
    /// Free space in reports is measured on the filesystem holding this path
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            startup_timeout: default_startup_timeout(),
            heartbeat_ready_timeout: default_heartbeat_ready_timeout(),
            storage_path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    /// Overrides the probed device id. Local dev only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: None,
            store_path: default_store_path(),
        }
    }
}

pub fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

pub fn default_connection_timeout_secs() -> u64 {
    30
}

pub fn default_keep_alive_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

pub fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

pub fn default_device_model() -> String {
    DEFAULT_DEVICE_MODEL.to_string()
}

pub fn default_request_channel_capacity() -> usize {
    10
}

pub fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

pub fn default_startup_timeout() -> Duration {
    Duration::from_secs(60)
}

pub fn default_heartbeat_ready_timeout() -> Duration {
    Duration::from_secs(10)
}

pub fn default_storage_path() -> PathBuf {
    PathBuf::from("/")
}

pub fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}
