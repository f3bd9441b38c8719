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

use std::sync::Arc;
use std::time::Instant;

use devlink::config::LinkAgentConfig;
use devlink::{
    BindingSink, BindingStore, DeviceRepository, IdentityProvider, JsonFileRepository,
    LinkCoordinator, StatusPublisher, StatusReporter,
};
use eyre::WrapErr;
use humantime::format_duration as dt;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::identity::HardwareIdentity;

pub async fn setup_and_run(agent_config: LinkAgentConfig) -> eyre::Result<()> {
    let started_at = Instant::now();

    let identity = HardwareIdentity::from_config(&agent_config).identify();
    tracing::info!(
        device_id = %identity.device_id,
        model = %identity.model,
        server_url = %agent_config.link.server_url,
        "Started devlink-agent"
    );

    let repository: Arc<dyn DeviceRepository> =
        Arc::new(JsonFileRepository::new(&agent_config.device.store_path));
    let binding = Arc::new(BindingStore::load(&identity, repository).wrap_err(format!(
        "Error loading device record from {}",
        agent_config.device.store_path.display()
    ))?);

    let coordinator = Arc::new(LinkCoordinator::new(
        identity,
        agent_config.link.clone(),
        binding.clone(),
    ));
    let publisher: Arc<dyn StatusPublisher> = coordinator.clone();
    let reporter = Arc::new(StatusReporter::new(
        binding,
        publisher,
        agent_config.report.clone(),
    ));

    // Register handlers before anything can take a while, so an early TERM
    // isn't lost.
    let mut term_signal = signal(SignalKind::terminate())?;
    let mut int_signal = signal(SignalKind::interrupt())?;
    let mut usr1_signal = signal(SignalKind::user_defined1())?;
    let mut hup_signal = signal(SignalKind::hangup())?;

    let cancel = CancellationToken::new();

    let connect = tokio::spawn({
        let coordinator = coordinator.clone();
        let sink: Arc<dyn BindingSink> = reporter.clone();
        async move {
            if let Err(e) = coordinator.start(sink).await {
                tracing::error!(
                    error = %e,
                    "Failed to initialize broker link, continuing disconnected"
                );
            }
        }
    });

    let startup = tokio::spawn({
        let reporter = reporter.clone();
        async move { reporter.send_startup_report().await }
    });

    let heartbeat = tokio::spawn({
        let reporter = reporter.clone();
        let cancel = cancel.clone();
        async move { reporter.run_heartbeat(cancel).await }
    });

    loop {
        tokio::select! {
            biased;
            _ = term_signal.recv() => {
                tracing::info!("TERM signal received, shutting down");
                break;
            }
            _ = int_signal.recv() => {
                tracing::info!("INT signal received, shutting down");
                break;
            }
            _ = usr1_signal.recv() => {
                tracing::info!("USR1 received, sending test report");
                match reporter.send_test_report().await {
                    Ok(report) => tracing::info!(report = ?report, "Test report assembled"),
                    Err(e) => tracing::error!(error = %e, "Test report failed"),
                }
                let status = coordinator.status().await;
                tracing::info!(
                    state = %status.state,
                    bound = status.bound,
                    ready = status.ready,
                    last_connected_at = ?status.last_connected_at,
                    stats = ?status.stats,
                    uptime = %dt(started_at.elapsed()),
                    "Link status"
                );
                coordinator.reset_stats();
            }
            _ = hup_signal.recv() => {
                tracing::info!("Hangup received, sending heartbeat now");
                if let Err(e) = reporter.send_heartbeat_now().await {
                    tracing::error!(error = %e, "Heartbeat failed");
                }
            }
        }
    }

    cancel.cancel();
    startup.abort();
    reporter.send_shutdown_report().await;

    // A connect that is still waiting for its CONNACK is abandoned.
    connect.abort();
    coordinator.shutdown().await;
    if let Err(e) = heartbeat.await {
        tracing::warn!(error = %e, "Heartbeat task ended abnormally");
    }

    tracing::info!(uptime = %dt(started_at.elapsed()), "devlink-agent stopped");
    Ok(())
}
