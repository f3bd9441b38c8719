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

// tests/common/mod.rs
// Shared fixtures: a recording BrokerLink and a fully wired coordinator
// and reporter around it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devlink::config::{LinkConfig, ReportConfig};
use devlink::{
    BindingSink, BindingStore, BrokerLink, DeviceIdentity, DeviceRecord, DeviceRepository,
    LinkCoordinator, LinkError, LinkEvent, MemoryRepository, QoS, RepositoryError,
    StatusPublisher, StatusReporter,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub const DEVICE_ID: &str = "CPU123";
pub const MODEL: &str = "RK3562";
pub const RESULT_TOPIC: &str = "dev/RK3562/CPU123/base/result";

// RecordingLink remembers every call and can be told to fail.
#[derive(Default)]
pub struct RecordingLink {
    pub subscriptions: Mutex<Vec<(String, QoS)>>,
    pub publishes: Mutex<Vec<(String, QoS, Vec<u8>)>>,
    pub fail_subscribe: AtomicBool,
    pub fail_publish: AtomicBool,
    pub closed: AtomicBool,
}

impl RecordingLink {
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.lock().unwrap().len()
    }

    // published returns (topic, decoded JSON payload) pairs.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.publishes
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _, payload)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }

    pub fn published_log_types(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|(_, report)| report["lt"].as_str().unwrap().to_string())
            .collect()
    }
}

#[async_trait]
impl BrokerLink for RecordingLink {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), LinkError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(LinkError::subscribe(topic, "refused by test"));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), LinkError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        self.publishes
            .lock()
            .unwrap()
            .push((topic.to_string(), qos, payload));
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// TestRepository is an in-memory store whose storage can be taken down.
#[derive(Default)]
pub struct TestRepository {
    memory: MemoryRepository,
    pub unavailable: AtomicBool,
}

impl TestRepository {
    pub fn record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.memory.record(device_id)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Io(std::io::Error::other("storage unavailable")));
        }
        Ok(())
    }
}

impl DeviceRepository for TestRepository {
    fn get_or_create(&self, device_id: &str, model: &str) -> Result<DeviceRecord, RepositoryError> {
        self.check()?;
        self.memory.get_or_create(device_id, model)
    }

    fn update_auth(&self, device_id: &str, token: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.memory.update_auth(device_id, token)
    }

    fn update_binding(
        &self,
        device_id: &str,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        self.memory.update_binding(device_id, tenant_id, user_id)
    }

    fn clear_binding(&self, device_id: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.memory.clear_binding(device_id)
    }
}

pub struct Harness {
    pub coordinator: Arc<LinkCoordinator>,
    pub reporter: Arc<StatusReporter>,
    pub binding: Arc<BindingStore>,
    pub repository: Arc<TestRepository>,
    pub link: Arc<RecordingLink>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
    pub attached: Result<(), LinkError>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(RecordingLink::default()).await
    }

    pub async fn start_with(link: RecordingLink) -> Self {
        let identity = DeviceIdentity::new(DEVICE_ID, MODEL);
        let repository = Arc::new(TestRepository::default());
        let binding = Arc::new(BindingStore::load(&identity, repository.clone()).unwrap());
        let coordinator = Arc::new(LinkCoordinator::new(
            identity,
            LinkConfig::default(),
            binding.clone(),
        ));
        let publisher: Arc<dyn StatusPublisher> = coordinator.clone();
        let reporter = Arc::new(StatusReporter::new(
            binding.clone(),
            publisher,
            ReportConfig::default(),
        ));

        let link = Arc::new(link);
        let (events, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn BindingSink> = reporter.clone();
        let attached = coordinator.attach(link.clone(), rx, sink).await;

        Self {
            coordinator,
            reporter,
            binding,
            repository,
            link,
            events,
            attached,
        }
    }

    pub fn sink(&self) -> &dyn BindingSink {
        self.reporter.as_ref()
    }

    pub async fn dispatch(&self, payload: &str) {
        self.coordinator.dispatch(payload.as_bytes(), self.sink()).await;
    }

    pub async fn handle(&self, event: LinkEvent) {
        self.coordinator.handle_event(event, self.sink()).await;
    }
}

pub fn binding_message(tenant_id: &str, user_id: &str, device_id: &str) -> String {
    serde_json::json!({
        "code": 2,
        "msg": "bind",
        "time": "2024-03-11 10:15:00",
        "timestamp": "1710152100",
        "data": {
            "tenantId": tenant_id,
            "userId": user_id,
            "deviceModel": MODEL,
            "env": "dev",
            "deviceId": device_id,
        }
    })
    .to_string()
}

// eventually polls `check` until it holds or two seconds pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
