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

// src/report.rs
// Outbound status report wire model and the local metrics it carries.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

// LogType labels why a report was sent. It is an open set on the wire, so
// it's a string newtype with a few well-known values rather than an enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogType(String);

impl LogType {
    pub const STARTUP: &'static str = "startup";
    pub const SHUTDOWN: &'static str = "shutdown";
    pub const HEARTBEAT: &'static str = "heartbeat";
    pub const BIND: &'static str = "bind";
    pub const UNBIND: &'static str = "unbind";
    pub const TEST: &'static str = "test";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn startup() -> Self {
        Self::new(Self::STARTUP)
    }

    pub fn shutdown() -> Self {
        Self::new(Self::SHUTDOWN)
    }

    pub fn heartbeat() -> Self {
        Self::new(Self::HEARTBEAT)
    }

    pub fn bind() -> Self {
        Self::new(Self::BIND)
    }

    pub fn unbind() -> Self {
        Self::new(Self::UNBIND)
    }

    pub fn test() -> Self {
        Self::new(Self::TEST)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// StatusReport is an immutable snapshot published to the per-binding
/// status topic. Keys are abbreviated on the wire to keep payloads small.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "dId")]
    pub device_id: String,
    #[serde(rename = "lt")]
    pub log_type: LogType,
    #[serde(rename = "tId")]
    pub tenant_id: Option<String>,
    #[serde(rename = "uId")]
    pub user_id: Option<String>,
    #[serde(rename = "vf")]
    pub firmware_version: String,
    #[serde(rename = "va")]
    pub audio_version: String,
    #[serde(rename = "pufc")]
    pub pending_upload_count: u32,
    #[serde(rename = "rsb")]
    pub remaining_storage_bytes: u64,
    #[serde(rename = "blp")]
    pub battery_percent: u8,
    #[serde(rename = "ssd")]
    pub signal_dbm: i16,
    #[serde(rename = "dt")]
    pub epoch_seconds: i64,
}

impl StatusReport {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// Nothing on the board reports these yet. They're named so that nobody
// mistakes them for live readings.
pub const PLACEHOLDER_PENDING_UPLOAD_COUNT: u32 = 0;
pub const PLACEHOLDER_BATTERY_PERCENT: u8 = 100;
pub const PLACEHOLDER_SIGNAL_DBM: i16 = -50;

// LocalMetrics is the best-effort device health block of a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalMetrics {
    pub pending_upload_count: u32,
    pub remaining_storage_bytes: u64,
    pub battery_percent: u8,
    pub signal_dbm: i16,
}

impl LocalMetrics {
    // sample reads free space under `storage_path`; everything else is a
    // placeholder.
    pub fn sample(storage_path: &Path) -> Self {
        Self {
            pending_upload_count: PLACEHOLDER_PENDING_UPLOAD_COUNT,
            remaining_storage_bytes: remaining_storage_bytes(storage_path),
            battery_percent: PLACEHOLDER_BATTERY_PERCENT,
            signal_dbm: PLACEHOLDER_SIGNAL_DBM,
        }
    }
}

// remaining_storage_bytes returns free bytes on the filesystem holding
// `path`, or 0 when it can't be determined.
pub fn remaining_storage_bytes(path: &Path) -> u64 {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => (stat.blocks_free() as u64).saturating_mul(stat.fragment_size() as u64),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "statvfs failed, reporting 0 free bytes");
            0
        }
    }
}
