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

// src/transport/mqtt.rs
// MqttLink is the rumqttc-backed BrokerLink.
//
// The rumqttc EventLoop is owned by a single pump task. The pump turns
// incoming packets into LinkEvents, completes pending subscribes when
// their SUBACK arrives, and drives automatic reconnects with fresh
// credentials.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::options::ConnectOptions;
use super::{BrokerLink, LinkEvent};
use crate::credentials::Credentials;
use crate::errors::LinkError;

const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(120);

// CredentialSource is called once per connect attempt, so time-based
// credentials are always current when the broker sees them.
pub type CredentialSource = Arc<dyn Fn() -> Credentials + Send + Sync>;

type SubscribeResult = Result<(), String>;

// Shared is the state both the handle and the pump task touch.
struct Shared {
    shutdown: CancellationToken,
    // pending_subscribe is completed by the pump on SUBACK. Only one
    // subscribe is in flight at a time (see subscribe_lock).
    pending_subscribe: Mutex<Option<oneshot::Sender<SubscribeResult>>>,
    subscribe_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn complete_subscribe(&self, result: SubscribeResult) {
        let pending = self
            .pending_subscribe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!("Received SUBACK with no pending subscribe"),
        }
    }

    fn fail_pending_subscribe(&self, reason: &str) {
        if let Some(tx) = self
            .pending_subscribe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}

pub struct MqttLink {
    client: AsyncClient,
    shared: Arc<Shared>,
    pump: Mutex<Option<JoinHandle<()>>>,
    // ack_timeout bounds the wait for SUBACK and for the pump to wind
    // down on close.
    ack_timeout: Duration,
}

impl MqttLink {
    /// connect opens the connection and waits for CONNACK (bounded by the
    /// configured connection timeout). On success the returned receiver
    /// carries every subsequent LinkEvent.
    pub async fn connect(
        options: &ConnectOptions,
        credentials: CredentialSource,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LinkEvent>), LinkError> {
        let initial = credentials();
        info!(
            endpoint = %options.endpoint,
            client_id = %initial.client_id,
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(
            options.mqtt_options(&initial),
            options.request_channel_capacity,
        );
        eventloop.network_options = options.network_options();

        let connack = tokio::time::timeout(options.connection_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(ConnectionError::NetworkTimeout) => {
                        return Err(LinkError::ConnectTimeout(options.connection_timeout));
                    }
                    Err(e) => return Err(LinkError::connect(e.to_string())),
                }
            }
        })
        .await;

        match connack {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(LinkError::ConnectTimeout(options.connection_timeout)),
        }
        info!(endpoint = %options.endpoint, "Connected to MQTT broker");

        let shared = Arc::new(Shared {
            shutdown: CancellationToken::new(),
            pending_subscribe: Mutex::new(None),
            subscribe_lock: tokio::sync::Mutex::new(()),
        });
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(
            eventloop,
            options.automatic_reconnect,
            credentials,
            shared.clone(),
            events_tx,
        ));

        Ok((
            Self {
                client,
                shared,
                pump: Mutex::new(Some(pump)),
                ack_timeout: options.connection_timeout,
            },
            events_rx,
        ))
    }
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), LinkError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(LinkError::Closed);
        }
        let _serialized = self.shared.subscribe_lock.lock().await;

        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .pending_subscribe
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        if let Err(e) = self.client.subscribe(topic, qos).await {
            self.shared
                .pending_subscribe
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Err(e.into());
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(LinkError::subscribe(topic, reason)),
            Ok(Err(_)) => Err(LinkError::Closed),
            Err(_) => {
                self.shared
                    .pending_subscribe
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                Err(LinkError::subscribe(topic, "timed out waiting for SUBACK"))
            }
        }
    }

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), LinkError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(LinkError::Closed);
        }
        self.client.publish(topic, qos, false, payload).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.shared.shutdown.cancel();
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "Disconnect request not delivered");
        }

        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut pump) = pump {
            if tokio::time::timeout(self.ack_timeout, &mut pump).await.is_err() {
                warn!("MQTT event loop did not stop in time, aborting it");
                pump.abort();
            }
        }
        info!("MQTT link closed");
        Ok(())
    }
}

// pump_events owns the EventLoop until the link is closed, the event
// receiver goes away, or the connection drops with automatic reconnect
// disabled.
async fn pump_events(
    mut eventloop: EventLoop,
    automatic_reconnect: bool,
    credentials: CredentialSource,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut connected = true;
    let mut attempt: u32 = 0;
    let mut backoff = INITIAL_RECONNECT_BACKOFF;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if connected {
                    continue;
                }
                connected = true;
                attempt = 0;
                backoff = INITIAL_RECONNECT_BACKOFF;
                info!("Reconnected to MQTT broker");
                LinkEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => LinkEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let refused = suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if refused {
                    shared.complete_subscribe(Err("broker refused subscription".to_string()));
                } else {
                    shared.complete_subscribe(Ok(()));
                }
                continue;
            }
            Ok(Event::Incoming(Packet::PubAck(puback))) => LinkEvent::DeliveryComplete(puback.pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) if shared.shutdown.is_cancelled() => break,
            Ok(_) => continue,
            Err(e) => {
                if shared.shutdown.is_cancelled() {
                    break;
                }
                shared.fail_pending_subscribe("connection lost");

                if connected {
                    connected = false;
                    warn!(error = %e, "Lost connection to MQTT broker");
                    if events.send(LinkEvent::ConnectionLost(e.to_string())).is_err() {
                        break;
                    }
                } else {
                    debug!(error = %e, attempt, "Reconnect attempt failed");
                }

                if !automatic_reconnect {
                    info!("Automatic reconnect disabled, MQTT event loop stopping");
                    break;
                }

                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                attempt += 1;

                let fresh = credentials();
                eventloop
                    .mqtt_options
                    .set_credentials(fresh.username, fresh.password);
                LinkEvent::Reconnecting { attempt }
            }
        };

        if events.send(event).is_err() {
            debug!("Link event receiver dropped, MQTT event loop stopping");
            break;
        }
    }

    shared.fail_pending_subscribe("link closed");
}
