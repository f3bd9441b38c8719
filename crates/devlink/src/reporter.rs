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

// src/reporter.rs
// Status reporter: assembles status reports and decides when to send
// them (startup, heartbeat, shutdown, bind/unbind, on demand).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::binding::BindingStore;
use crate::config::ReportConfig;
use crate::coordinator::{BindingSink, PublishOutcome};
use crate::errors::LinkError;
use crate::report::{LocalMetrics, LogType, StatusReport};

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// StatusPublisher is the part of the link the reporter needs.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(&self, report: &StatusReport) -> Result<PublishOutcome, LinkError>;

    /// await_ready waits for the link's readiness gate.
    async fn await_ready(&self, timeout: Duration) -> bool;
}

pub struct StatusReporter {
    binding: Arc<BindingStore>,
    publisher: Arc<dyn StatusPublisher>,
    config: ReportConfig,
}

impl StatusReporter {
    pub fn new(
        binding: Arc<BindingStore>,
        publisher: Arc<dyn StatusPublisher>,
        config: ReportConfig,
    ) -> Self {
        Self {
            binding,
            publisher,
            config,
        }
    }

    /// assemble builds a report from the current binding, the stored
    /// device record and whatever local metrics can be read.
    pub async fn assemble(&self, log_type: LogType) -> Result<StatusReport, LinkError> {
        let binding = self.binding.snapshot().await;
        let record = self.binding.record().await?;
        let metrics = LocalMetrics::sample(&self.config.storage_path);

        Ok(StatusReport {
            device_id: self.binding.device_id().to_string(),
            log_type,
            tenant_id: binding.tenant_id,
            user_id: binding.user_id,
            firmware_version: record.firmware_version,
            audio_version: record.audio_version,
            pending_upload_count: metrics.pending_upload_count,
            remaining_storage_bytes: metrics.remaining_storage_bytes,
            battery_percent: metrics.battery_percent,
            signal_dbm: metrics.signal_dbm,
            epoch_seconds: Utc::now().timestamp(),
        })
    }

    /// publish is the background path: every failure is logged and
    /// swallowed.
    pub async fn publish(&self, log_type: LogType) {
        let report = match self.assemble(log_type.clone()).await {
            Ok(report) => report,
            Err(e) => {
                error!(%log_type, error = %e, "Failed to assemble status report");
                return;
            }
        };
        self.send(&report).await;
    }

    // send publishes an assembled report and logs the outcome.
    async fn send(&self, report: &StatusReport) {
        match self.publisher.publish_status(report).await {
            Ok(PublishOutcome::Published) => {
                info!(log_type = %report.log_type, "Status report sent");
            }
            Ok(PublishOutcome::Skipped(reason)) => {
                debug!(log_type = %report.log_type, %reason, "Status report skipped");
            }
            Err(e) => {
                error!(log_type = %report.log_type, error = %e, "Failed to publish status report");
            }
        }
    }

    // send_interactive surfaces assembly and persistence failures to the
    // caller. Publish problems are still only logged.
    async fn send_interactive(&self, log_type: LogType) -> Result<StatusReport, LinkError> {
        let report = self.assemble(log_type).await?;
        self.send(&report).await;
        Ok(report)
    }

    /// send_test_report is the manual "test" trigger.
    pub async fn send_test_report(&self) -> Result<StatusReport, LinkError> {
        self.send_interactive(LogType::test()).await
    }

    /// send_heartbeat_now sends a heartbeat outside the schedule.
    pub async fn send_heartbeat_now(&self) -> Result<StatusReport, LinkError> {
        self.send_interactive(LogType::heartbeat()).await
    }

    /// send_startup_report waits for the link to become ready (bounded by
    /// the startup timeout) and sends the startup report. On timeout no
    /// report is sent.
    pub async fn send_startup_report(&self) {
        if self.publisher.await_ready(self.config.startup_timeout).await {
            self.publish(LogType::startup()).await;
        } else {
            error!(
                timeout = ?self.config.startup_timeout,
                "Link not ready in time, startup report not sent"
            );
        }
    }

    pub async fn send_shutdown_report(&self) {
        self.publish(LogType::shutdown()).await;
    }

    /// run_heartbeat sends a heartbeat right away and then every heartbeat
    /// interval until `cancel` fires. A tick is skipped when the link isn't
    /// ready within the heartbeat ready timeout.
    pub async fn run_heartbeat(&self, cancel: CancellationToken) {
        let period = self.config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?period, "Heartbeat scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let ready = tokio::select! {
                _ = cancel.cancelled() => break,
                ready = self.publisher.await_ready(self.config.heartbeat_ready_timeout) => ready,
            };
            if !ready {
                warn!("Link not ready, skipping heartbeat");
                continue;
            }
            self.publish(LogType::heartbeat()).await;
        }
        info!("Heartbeat scheduler stopped");
    }
}

#[async_trait]
impl BindingSink for StatusReporter {
    async fn on_bound(&self) {
        self.publish(LogType::bind()).await;
    }

    async fn on_unbound(&self) {
        self.publish(LogType::unbind()).await;
    }
}
