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

// src/binding.rs
// Shared tenant/user binding and auth token for this device.
//
// Every mutation is written through the DeviceRepository first and only
// applied in memory once persistence succeeded. Both happen under the same
// write lock, so a concurrent reader never sees a half-updated
// tenant/user pair, and memory never runs ahead of what's on disk.
// Repository calls may touch the filesystem and run on the blocking pool.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::errors::RepositoryError;
use crate::identity::DeviceIdentity;
use crate::repository::{DeviceRecord, DeviceRepository};

// DeviceBindingState is a point-in-time snapshot. "Bound" is derived from
// the presence of both ids rather than stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceBindingState {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub auth_token: Option<String>,
}

impl DeviceBindingState {
    pub fn is_bound(&self) -> bool {
        self.tenant_id.is_some() && self.user_id.is_some()
    }

    // binding returns (tenant_id, user_id) when bound.
    pub fn binding(&self) -> Option<(&str, &str)> {
        match (&self.tenant_id, &self.user_id) {
            (Some(tenant_id), Some(user_id)) => Some((tenant_id.as_str(), user_id.as_str())),
            _ => None,
        }
    }
}

impl From<&DeviceRecord> for DeviceBindingState {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            user_id: record.user_id.clone(),
            auth_token: record.token.clone(),
        }
    }
}

/// BindingStore owns the in-memory binding state for one device and keeps
/// it in step with the repository.
pub struct BindingStore {
    device_id: String,
    model: String,
    repository: Arc<dyn DeviceRepository>,
    state: RwLock<DeviceBindingState>,
}

impl BindingStore {
    /// load fetches (or creates) the device record and seeds the in-memory
    /// state from it. Called once at startup.
    pub fn load(
        identity: &DeviceIdentity,
        repository: Arc<dyn DeviceRepository>,
    ) -> Result<Self, RepositoryError> {
        let record = repository.get_or_create(&identity.device_id, &identity.model)?;
        let state = DeviceBindingState::from(&record);
        info!(
            device_id = %identity.device_id,
            bound = state.is_bound(),
            "Loaded device binding state"
        );
        Ok(Self {
            device_id: identity.device_id.clone(),
            model: identity.model.clone(),
            repository,
            state: RwLock::new(state),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn snapshot(&self) -> DeviceBindingState {
        self.state.read().await.clone()
    }

    pub async fn is_bound(&self) -> bool {
        self.state.read().await.is_bound()
    }

    // record reads the full persisted record, e.g. for firmware versions.
    pub async fn record(&self) -> Result<DeviceRecord, RepositoryError> {
        let (device_id, model) = (self.device_id.clone(), self.model.clone());
        self.with_repository(move |repository| repository.get_or_create(&device_id, &model))
            .await
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let (device_id, stored) = (self.device_id.clone(), token.to_string());
        self.with_repository(move |repository| repository.update_auth(&device_id, &stored))
            .await?;
        state.auth_token = Some(token.to_string());
        Ok(())
    }

    // bind always keys on this store's own device id; callers have no way
    // to redirect a binding to another device.
    pub async fn bind(&self, tenant_id: &str, user_id: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let device_id = self.device_id.clone();
        let (tenant, user) = (tenant_id.to_string(), user_id.to_string());
        self.with_repository(move |repository| {
            repository.update_binding(&device_id, &tenant, &user)
        })
        .await?;
        state.tenant_id = Some(tenant_id.to_string());
        state.user_id = Some(user_id.to_string());
        Ok(())
    }

    pub async fn unbind(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let device_id = self.device_id.clone();
        self.with_repository(move |repository| repository.clear_binding(&device_id))
            .await?;
        state.tenant_id = None;
        state.user_id = None;
        Ok(())
    }

    async fn with_repository<T, F>(&self, op: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DeviceRepository) -> Result<T, RepositoryError> + Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || op(repository.as_ref()))
            .await
            .map_err(|e| RepositoryError::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn store() -> (Arc<MemoryRepository>, BindingStore) {
        let repo = Arc::new(MemoryRepository::new());
        let identity = DeviceIdentity::new("CPU123", "RK3562");
        let store = BindingStore::load(&identity, repo.clone()).unwrap();
        (repo, store)
    }

    #[tokio::test]
    async fn test_load_seeds_from_existing_record() {
        let repo = Arc::new(MemoryRepository::new());
        repo.get_or_create("CPU123", "RK3562").unwrap();
        repo.update_binding("CPU123", "T1", "U1").unwrap();

        let identity = DeviceIdentity::new("CPU123", "RK3562");
        let store = BindingStore::load(&identity, repo).unwrap();
        let state = store.snapshot().await;
        assert!(state.is_bound());
        assert_eq!(state.binding(), Some(("T1", "U1")));
    }

    #[tokio::test]
    async fn test_bind_then_unbind() {
        let (repo, store) = store();
        assert!(!store.is_bound().await);

        store.bind("T1", "U1").await.unwrap();
        assert!(store.is_bound().await);
        assert!(repo.record("CPU123").unwrap().is_bound());

        store.unbind().await.unwrap();
        assert!(!store.is_bound().await);
        assert!(!repo.record("CPU123").unwrap().is_bound());
    }

    #[tokio::test]
    async fn test_auth_token_persisted() {
        let (repo, store) = store();
        store.set_auth_token("T").await.unwrap();
        assert_eq!(store.snapshot().await.auth_token.as_deref(), Some("T"));
        assert_eq!(repo.record("CPU123").unwrap().token.as_deref(), Some("T"));
    }

    // A repository that refuses every write.
    struct ReadOnlyRepository(MemoryRepository);

    impl DeviceRepository for ReadOnlyRepository {
        fn get_or_create(&self, id: &str, model: &str) -> Result<DeviceRecord, RepositoryError> {
            self.0.get_or_create(id, model)
        }
        fn update_auth(&self, id: &str, _: &str) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }
        fn update_binding(&self, id: &str, _: &str, _: &str) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }
        fn clear_binding(&self, id: &str) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_json_file_writes_keep_runtime_responsive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let repo = Arc::new(crate::repository::JsonFileRepository::new(&path));
        let identity = DeviceIdentity::new("CPU123", "RK3562");
        let store = Arc::new(BindingStore::load(&identity, repo).unwrap());

        // A sibling task keeps ticking while the store writes to disk.
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });

        for n in 0..20 {
            store.bind(&format!("T{n}"), "U1").await.unwrap();
            store.set_auth_token(&format!("tok-{n}")).await.unwrap();
        }
        store.unbind().await.unwrap();
        ticker.abort();

        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 0);
        let record = store.record().await.unwrap();
        assert!(!record.is_bound());
        assert_eq!(record.token.as_deref(), Some("tok-19"));

        let reopened = crate::repository::JsonFileRepository::new(&path);
        let persisted = reopened.get_or_create("CPU123", "RK3562").unwrap();
        assert_eq!(persisted.token.as_deref(), Some("tok-19"));
        assert!(!persisted.is_bound());
    }

    #[tokio::test]
    async fn test_failed_persistence_leaves_memory_unchanged() {
        let repo = Arc::new(ReadOnlyRepository(MemoryRepository::new()));
        let identity = DeviceIdentity::new("CPU123", "RK3562");
        let store = BindingStore::load(&identity, repo).unwrap();

        assert!(store.bind("T1", "U1").await.is_err());
        assert!(store.set_auth_token("T").await.is_err());
        assert_eq!(store.snapshot().await, DeviceBindingState::default());
    }
}
