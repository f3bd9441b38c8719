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

// src/transport/mod.rs
// The broker link: a guarded handle exposing only subscribe, publish and
// close, plus the ordered event stream the transport delivers.
//
// Nothing outside this module touches rumqttc's client or event loop
// directly.

mod endpoint;
mod mqtt;
mod options;

use async_trait::async_trait;
use rumqttc::QoS;

pub use endpoint::BrokerEndpoint;
pub use mqtt::{CredentialSource, MqttLink};
pub use options::{ClientTlsConfig, ConnectOptions};

use crate::errors::LinkError;

// LinkEvent is everything the transport reports back, in the order it
// happened on the wire. Events arrive sequentially relative to each other
// but asynchronously to everything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    // Reconnecting is sent before each automatic reconnect attempt.
    Reconnecting { attempt: u32 },
    // Connected is sent when a reconnect attempt got its CONNACK. The
    // initial connect is reported by MqttLink::connect returning instead.
    Connected,
    // ConnectionLost is sent once per established connection.
    ConnectionLost(String),
    // Message is an inbound PUBLISH.
    Message { topic: String, payload: Vec<u8> },
    // DeliveryComplete is the PUBACK for one of our QoS 1 publishes.
    DeliveryComplete(u16),
}

/// BrokerLink is the guarded connection handle.
///
/// Implementations must be safe to call from many tasks at once; calls
/// are serialized onto the single underlying connection.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// subscribe returns once the broker acknowledged the subscription.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), LinkError>;

    /// publish returns once the message was handed to the connection.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), LinkError>;

    /// close disconnects and stops any automatic reconnects.
    async fn close(&self) -> Result<(), LinkError>;
}
