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

// src/transport/options.rs
// Connection options for the broker link, built from LinkConfig.

use std::time::Duration;

use rumqttc::{MqttOptions, NetworkOptions, Transport};

use super::endpoint::BrokerEndpoint;
use crate::config::LinkConfig;
use crate::credentials::Credentials;
use crate::errors::LinkError;

// ConnectOptions is everything needed to open (and re-open) the broker
// connection except the credentials, which are derived per attempt.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub endpoint: BrokerEndpoint,
    // connection_timeout bounds the wait for CONNACK and SUBACK.
    pub connection_timeout: Duration,
    pub keep_alive: Duration,
    pub clean_session: bool,
    // automatic_reconnect tells the transport to keep re-dialing after
    // the connection drops, refreshing credentials on every attempt.
    pub automatic_reconnect: bool,
    // request_channel_capacity is the number of outgoing requests the
    // MQTT client buffers before publish calls start waiting.
    pub request_channel_capacity: usize,
    // tls_config is set when the endpoint is secure.
    pub tls_config: Option<ClientTlsConfig>,
}

// ClientTlsConfig is config for using TLS with the MQTT server.
#[derive(Clone, Debug, Default)]
pub struct ClientTlsConfig {
    // ca_certificate is PEM bytes for a CA certificate (or bundle).
    // When None, the platform's native roots are used.
    pub ca_certificate: Option<Vec<u8>>,
}

impl ConnectOptions {
    pub fn from_config(config: &LinkConfig) -> Result<Self, LinkError> {
        let endpoint = BrokerEndpoint::parse(&config.server_url)?;

        let tls_config = if endpoint.secure {
            let ca_certificate = match &config.ca_file {
                Some(path) => Some(std::fs::read(path).map_err(|e| {
                    LinkError::Tls(format!("reading CA file {}: {e}", path.display()))
                })?),
                None => None,
            };
            Some(ClientTlsConfig { ca_certificate })
        } else {
            None
        };

        Ok(Self {
            endpoint,
            connection_timeout: config.connection_timeout(),
            keep_alive: config.keep_alive_interval(),
            clean_session: config.clean_session,
            automatic_reconnect: config.automatic_reconnect,
            request_channel_capacity: config.request_channel_capacity.max(1),
            tls_config,
        })
    }

    // mqtt_options builds the rumqttc options for one connect attempt.
    pub fn mqtt_options(&self, credentials: &Credentials) -> MqttOptions {
        let mut options = MqttOptions::new(
            credentials.client_id.clone(),
            self.endpoint.host.clone(),
            self.endpoint.port,
        );
        options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(self.clean_session)
            .set_credentials(credentials.username.clone(), credentials.password.clone());

        if let Some(tls_config) = &self.tls_config {
            let transport = match &tls_config.ca_certificate {
                Some(ca) => Transport::tls(ca.clone(), None, None),
                None => Transport::tls_with_default_config(),
            };
            options.set_transport(transport);
        }

        options
    }

    // network_options bounds each TCP/TLS/CONNACK exchange inside rumqttc
    // by the configured connection timeout, reconnects included.
    pub fn network_options(&self) -> NetworkOptions {
        let mut network = NetworkOptions::new();
        network.set_connection_timeout(self.connection_timeout.as_secs().max(1));
        network
    }
}
