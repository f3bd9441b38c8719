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

// src/coordinator.rs
// The link coordinator: connection lifecycle, subscription, inbound
// dispatch and the gate that keeps status publishes off the wire until
// the link is subscribed and the device is bound.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::QoS;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::binding::BindingStore;
use crate::config::LinkConfig;
use crate::credentials;
use crate::envelope::Inbound;
use crate::errors::LinkError;
use crate::gate::ReadinessGate;
use crate::identity::DeviceIdentity;
use crate::report::StatusReport;
use crate::reporter::StatusPublisher;
use crate::stats::{PublishStats, PublishStatsTracker};
use crate::transport::{BrokerLink, ConnectOptions, CredentialSource, LinkEvent, MqttLink};

// How long shutdown lets the dispatch loop drain after the link closed.
const DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    ConnectionLost,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::ConnectionLost => "connection-lost",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotSubscribed,
    NotBound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => f.write_str("link not subscribed"),
            Self::NotBound => f.write_str("device not bound"),
        }
    }
}

// PublishOutcome is the non-error result of a publish. A skip is an
// expected condition, not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Skipped(SkipReason),
}

/// LinkStatus is a point-in-time view of the link for operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub server_url: String,
    pub bound: bool,
    pub ready: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub stats: PublishStats,
}

/// BindingSink is told about binding changes made by inbound messages.
/// The status reporter implements it to send bind/unbind confirmations.
#[async_trait]
pub trait BindingSink: Send + Sync {
    async fn on_bound(&self);
    async fn on_unbound(&self);
}

pub struct LinkCoordinator {
    identity: DeviceIdentity,
    config: LinkConfig,
    binding: Arc<BindingStore>,
    state: watch::Sender<ConnectionState>,
    gate: ReadinessGate,
    link: RwLock<Option<Arc<dyn BrokerLink>>>,
    stats: PublishStatsTracker,
    last_connected_at: Mutex<Option<DateTime<Utc>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl LinkCoordinator {
    pub fn new(identity: DeviceIdentity, config: LinkConfig, binding: Arc<BindingStore>) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            identity,
            config,
            binding,
            state,
            gate: ReadinessGate::new(),
            link: RwLock::new(None),
            stats: PublishStatsTracker::new(),
            last_connected_at: Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> PublishStats {
        self.stats.to_stats()
    }

    // reset_stats zeroes the publish counters, e.g. after a status dump so
    // the next one covers only the interval since.
    pub fn reset_stats(&self) {
        self.stats.reset_counters();
    }

    /// `{env}/{model}/{device_id}/base/result`
    pub fn result_topic(&self) -> String {
        format!(
            "{}/{}/{}/base/result",
            self.config.env, self.identity.model, self.identity.device_id
        )
    }

    /// `{env}/{model}/{device_id}/{tenant_id}/{user_id}/base/status`
    pub fn status_topic(&self, tenant_id: &str, user_id: &str) -> String {
        format!(
            "{}/{}/{}/{tenant_id}/{user_id}/base/status",
            self.config.env, self.identity.model, self.identity.device_id
        )
    }

    /// start connects to the configured broker, subscribes and starts the
    /// dispatch loop. Returns once the broker acknowledged the connection
    /// and the subscription, or with the error that stopped it.
    pub async fn start(self: &Arc<Self>, sink: Arc<dyn BindingSink>) -> Result<(), LinkError> {
        self.set_state(ConnectionState::Connecting);

        let options = match ConnectOptions::from_config(&self.config) {
            Ok(options) => options,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let device_id = self.identity.device_id.clone();
        let credentials: CredentialSource = Arc::new(move || credentials::derive_now(&device_id));

        match MqttLink::connect(&options, credentials).await {
            Ok((link, events)) => self.attach(Arc::new(link), events, sink).await,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// attach takes over an already connected link and its event stream:
    /// subscribes to the result topic and spawns the dispatch loop. The
    /// loop is started even when the subscribe fails, so a later
    /// reconnect can still subscribe.
    pub async fn attach(
        self: &Arc<Self>,
        link: Arc<dyn BrokerLink>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        sink: Arc<dyn BindingSink>,
    ) -> Result<(), LinkError> {
        *self.link.write().await = Some(link);
        self.mark_connected();

        let subscribed = self.subscribe_results().await;

        let dispatcher = tokio::spawn(self.clone().run(events, sink));
        *self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);

        subscribed
    }

    async fn subscribe_results(&self) -> Result<(), LinkError> {
        let link = self.current_link().await.ok_or(LinkError::Closed)?;
        let topic = self.result_topic();

        if let Err(e) = link.subscribe(&topic, QoS::AtLeastOnce).await {
            error!(%topic, error = %e, "Failed to subscribe to result topic");
            return Err(e);
        }

        self.set_state(ConnectionState::Subscribed);
        info!(%topic, "Subscribed to result topic");
        if self.gate.release() {
            info!("Link ready, releasing waiters");
        }
        Ok(())
    }

    // run is the single consumer of link events. It only ends when the
    // transport drops its side of the channel.
    async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<LinkEvent>,
        sink: Arc<dyn BindingSink>,
    ) {
        while let Some(event) = events.recv().await {
            self.handle_event(event, sink.as_ref()).await;
        }
        debug!("Link event channel closed, dispatch loop exiting");
    }

    pub async fn handle_event(&self, event: LinkEvent, sink: &dyn BindingSink) {
        match event {
            LinkEvent::Reconnecting { attempt } => {
                info!(attempt, "Reconnecting to broker");
                self.set_state(ConnectionState::Connecting);
            }
            LinkEvent::Connected => {
                self.mark_connected();
                // Errors are logged inside; the next reconnect retries.
                let _ = self.subscribe_results().await;
            }
            LinkEvent::ConnectionLost(reason) => {
                warn!(%reason, "Connection to broker lost");
                self.set_state(ConnectionState::ConnectionLost);
            }
            LinkEvent::Message { topic, payload } => {
                debug!(%topic, bytes = payload.len(), "Received message");
                self.dispatch(&payload, sink).await;
            }
            LinkEvent::DeliveryComplete(pkid) => {
                debug!(pkid, "Delivery complete");
            }
        }
    }

    /// dispatch handles one inbound message. Nothing about the content of
    /// a message can make this fail; problems are logged and the message
    /// dropped.
    pub async fn dispatch(&self, payload: &[u8], sink: &dyn BindingSink) {
        match Inbound::parse(payload) {
            Ok(inbound) => self.handle_inbound(inbound, sink).await,
            Err(e) => warn!(error = %e, "Dropping malformed inbound message"),
        }
    }

    async fn handle_inbound(&self, inbound: Inbound, sink: &dyn BindingSink) {
        match inbound {
            Inbound::Auth(auth) => match auth.allowed_token() {
                Some(token) => match self.binding.set_auth_token(token).await {
                    Ok(()) => info!("Device authenticated, token stored"),
                    Err(e) => error!(error = %e, "Failed to store auth token"),
                },
                None => warn!(result = ?auth.result, "Device authentication not allowed"),
            },
            Inbound::Binding(notice) => {
                if let Some(other) = notice
                    .device_id
                    .as_deref()
                    .filter(|id| *id != self.identity.device_id)
                {
                    warn!(
                        payload_device_id = other,
                        device_id = %self.identity.device_id,
                        "Binding notice names another device id, applying to this device"
                    );
                }
                match self.binding.bind(&notice.tenant_id, &notice.user_id).await {
                    Ok(()) => {
                        info!(
                            tenant_id = %notice.tenant_id,
                            user_id = %notice.user_id,
                            "Device bound"
                        );
                        sink.on_bound().await;
                    }
                    Err(e) => error!(error = %e, "Failed to persist device binding"),
                }
            }
            Inbound::Unbinding => match self.binding.unbind().await {
                Ok(()) => {
                    info!("Device unbound");
                    sink.on_unbound().await;
                }
                Err(e) => error!(error = %e, "Failed to persist device unbinding"),
            },
            Inbound::Unknown(code) => warn!(code, "Ignoring message with unknown code"),
        }
    }

    /// publish sends a status report to this binding's status topic.
    ///
    /// Returns `Skipped` without touching the network unless the link is
    /// subscribed and the device bound.
    pub async fn publish(&self, report: &StatusReport) -> Result<PublishOutcome, LinkError> {
        let state = self.state();
        if state != ConnectionState::Subscribed {
            return Ok(self.skip(report, SkipReason::NotSubscribed));
        }

        let binding = self.binding.snapshot().await;
        let Some((tenant_id, user_id)) = binding.binding() else {
            return Ok(self.skip(report, SkipReason::NotBound));
        };

        let Some(link) = self.current_link().await else {
            return Ok(self.skip(report, SkipReason::NotSubscribed));
        };

        let topic = self.status_topic(tenant_id, user_id);
        let payload = report.to_json()?;
        let bytes = payload.len();

        match link.publish(&topic, QoS::AtLeastOnce, payload).await {
            Ok(()) => {
                self.stats.increment_published(bytes);
                debug!(%topic, log_type = %report.log_type, bytes, "Published status report");
                Ok(PublishOutcome::Published)
            }
            Err(e) => {
                self.stats.increment_failed();
                Err(e)
            }
        }
    }

    fn skip(&self, report: &StatusReport, reason: SkipReason) -> PublishOutcome {
        warn!(log_type = %report.log_type, %reason, "Skipping status report");
        self.stats.increment_skipped();
        PublishOutcome::Skipped(reason)
    }

    pub async fn await_ready(&self, timeout: Duration) -> bool {
        self.gate.wait(timeout).await
    }

    pub async fn status(&self) -> LinkStatus {
        let bound = self.binding.is_bound().await;
        let last_connected_at = *self
            .last_connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        LinkStatus {
            state: self.state(),
            server_url: self.config.server_url.clone(),
            bound,
            ready: self.gate.is_released(),
            last_connected_at,
            stats: self.stats.to_stats(),
        }
    }

    /// shutdown closes the link. Failures are logged, never returned.
    pub async fn shutdown(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            if let Err(e) = link.close().await {
                warn!(error = %e, "Error closing broker link");
            }
        }
        self.set_state(ConnectionState::Disconnected);

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut dispatcher) = dispatcher {
            if tokio::time::timeout(DISPATCH_DRAIN_TIMEOUT, &mut dispatcher)
                .await
                .is_err()
            {
                dispatcher.abort();
            }
        }
        info!("Link coordinator stopped");
    }

    async fn current_link(&self) -> Option<Arc<dyn BrokerLink>> {
        self.link.read().await.clone()
    }

    fn mark_connected(&self) {
        *self
            .last_connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.set_state(ConnectionState::Connected);
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }
}

#[async_trait]
impl StatusPublisher for LinkCoordinator {
    async fn publish_status(&self, report: &StatusReport) -> Result<PublishOutcome, LinkError> {
        self.publish(report).await
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        LinkCoordinator::await_ready(self, timeout).await
    }
}
