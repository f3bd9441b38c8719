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

// src/repository.rs
// Persisted device record store.
//
// The link core only talks to the DeviceRepository trait. Two stores
// ship with the crate: MemoryRepository for tests and ephemeral runs, and
// JsonFileRepository which keeps every record in one JSON document on
// local flash.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RepositoryError;

const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";
const DEFAULT_AUDIO_VERSION: &str = "0.0.1";

/// DeviceRecord is the persisted view of a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_model: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "default_audio_version")]
    pub audio_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_firmware_version() -> String {
    DEFAULT_FIRMWARE_VERSION.to_string()
}

fn default_audio_version() -> String {
    DEFAULT_AUDIO_VERSION.to_string()
}

impl DeviceRecord {
    pub fn new(device_id: &str, device_model: &str) -> Self {
        let now = Utc::now();
        Self {
            device_id: device_id.to_string(),
            device_model: device_model.to_string(),
            tenant_id: None,
            user_id: None,
            token: None,
            firmware_version: default_firmware_version(),
            audio_version: default_audio_version(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.tenant_id.is_some() && self.user_id.is_some()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// DeviceRepository persists device records keyed by device id.
///
/// Calls are synchronous and may block on storage; `BindingStore` runs them
/// on tokio's blocking pool. The update methods fail
/// with [`RepositoryError::NotFound`] when no record exists for the id.
pub trait DeviceRepository: Send + Sync {
    /// Returns the record for `device_id`, creating it when missing. An
    /// existing record gets its model refreshed.
    fn get_or_create(&self, device_id: &str, model: &str) -> Result<DeviceRecord, RepositoryError>;

    fn update_auth(&self, device_id: &str, token: &str) -> Result<(), RepositoryError>;

    fn update_binding(
        &self,
        device_id: &str,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError>;

    fn clear_binding(&self, device_id: &str) -> Result<(), RepositoryError>;
}

// The record-level operations are shared by both stores; they only
// differ in where the map lives.
fn get_or_create_in(
    records: &mut BTreeMap<String, DeviceRecord>,
    device_id: &str,
    model: &str,
) -> DeviceRecord {
    let record = records
        .entry(device_id.to_string())
        .and_modify(|existing| {
            if existing.device_model != model {
                existing.device_model = model.to_string();
                existing.touch();
            }
        })
        .or_insert_with(|| {
            info!(device_id, model, "Creating device record");
            DeviceRecord::new(device_id, model)
        });
    record.clone()
}

fn modify_in(
    records: &mut BTreeMap<String, DeviceRecord>,
    device_id: &str,
    change: impl FnOnce(&mut DeviceRecord),
) -> Result<(), RepositoryError> {
    let record = records
        .get_mut(device_id)
        .ok_or_else(|| RepositoryError::NotFound(device_id.to_string()))?;
    change(record);
    record.touch();
    Ok(())
}

fn set_auth(token: &str) -> impl FnOnce(&mut DeviceRecord) + '_ {
    move |record| record.token = Some(token.to_string())
}

fn set_binding<'a>(tenant_id: &'a str, user_id: &'a str) -> impl FnOnce(&mut DeviceRecord) + 'a {
    move |record| {
        record.tenant_id = Some(tenant_id.to_string());
        record.user_id = Some(user_id.to_string());
    }
}

fn clear_binding(record: &mut DeviceRecord) {
    record.tenant_id = None;
    record.user_id = None;
}

/// MemoryRepository keeps records in process memory only.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<BTreeMap<String, DeviceRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // record returns a copy of the stored record, if any.
    pub fn record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut BTreeMap<String, DeviceRecord>) -> T) -> T {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut records)
    }
}

impl DeviceRepository for MemoryRepository {
    fn get_or_create(&self, device_id: &str, model: &str) -> Result<DeviceRecord, RepositoryError> {
        Ok(self.with_records(|records| get_or_create_in(records, device_id, model)))
    }

    fn update_auth(&self, device_id: &str, token: &str) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, set_auth(token)))
    }

    fn update_binding(
        &self,
        device_id: &str,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, set_binding(tenant_id, user_id)))
    }

    fn clear_binding(&self, device_id: &str) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, clear_binding))
    }
}

/// JsonFileRepository stores all records as one pretty-printed JSON
/// object keyed by device id. Writes go to a sibling temp file which is
/// then renamed over the original, so a power cut leaves either the old
/// or the new document.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, DeviceRecord>, RepositoryError> {
        match fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Device store does not exist yet");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, records: &BTreeMap<String, DeviceRecord>) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    // with_records runs one read-modify-write cycle under the store lock.
    // The document is only rewritten when `f` succeeds.
    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, DeviceRecord>) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load()?;
        let result = f(&mut records)?;
        self.store(&records)?;
        Ok(result)
    }
}

impl DeviceRepository for JsonFileRepository {
    fn get_or_create(&self, device_id: &str, model: &str) -> Result<DeviceRecord, RepositoryError> {
        // Reports read the record on every tick; don't rewrite flash when
        // nothing changed.
        {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = self.load()?.remove(device_id) {
                if record.device_model == model {
                    return Ok(record);
                }
            }
        }
        self.with_records(|records| Ok(get_or_create_in(records, device_id, model)))
    }

    fn update_auth(&self, device_id: &str, token: &str) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, set_auth(token)))
    }

    fn update_binding(
        &self,
        device_id: &str,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, set_binding(tenant_id, user_id)))
    }

    fn clear_binding(&self, device_id: &str) -> Result<(), RepositoryError> {
        self.with_records(|records| modify_in(records, device_id, clear_binding))
    }
}
