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

// src/errors.rs
// Error types for the device link: connection, subscription, publishing,
// inbound envelope parsing and device record persistence.

use std::time::Duration;

use thiserror::Error;

// LinkError covers everything that can go wrong while talking to the
// broker or persisting state changes driven by broker traffic.
#[derive(Debug, Error)]
pub enum LinkError {
    // InvalidServerUrl is returned when the configured broker URL
    // can't be turned into a host/port/transport triple.
    #[error("invalid broker url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    // Connect is a refused or failed CONNECT handshake.
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    // ConnectTimeout is returned when no CONNACK arrived within the
    // configured connection timeout.
    #[error("timed out after {0:?} waiting for broker CONNACK")]
    ConnectTimeout(Duration),

    // Subscribe is a rejected or unacknowledged SUBSCRIBE.
    #[error("failed to subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    // Client wraps errors from queueing requests on the MQTT client.
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    // Tls is returned when TLS material could not be loaded.
    #[error("tls setup failed: {0}")]
    Tls(String),

    // Serialization wraps JSON encoding failures for outbound reports.
    #[error("failed to serialize status report: {0}")]
    Serialization(#[from] serde_json::Error),

    // Persistence wraps device repository failures.
    #[error("device record persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    // Closed is returned when the broker link was already shut down.
    #[error("broker link is closed")]
    Closed,
}

impl LinkError {
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect(reason.into())
    }

    pub fn subscribe(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_server_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidServerUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    // is_connection_error covers everything in the connect/subscribe
    // path, i.e. the ConnectError class of failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidServerUrl { .. }
                | Self::Connect(_)
                | Self::ConnectTimeout(_)
                | Self::Subscribe { .. }
                | Self::Client(_)
                | Self::Tls(_)
                | Self::Closed
        )
    }

    pub fn is_persistence_error(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

// RepositoryError is returned by DeviceRepository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no device record for '{0}'")]
    NotFound(String),

    #[error("device store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// EnvelopeError is a malformed inbound message. The offending message is
// dropped; nothing upstream ever sees this error.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("payload for code {code} has unexpected shape: {source}")]
    InvalidData {
        code: i64,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_classification() {
        assert!(LinkError::connect("refused").is_connection_error());
        assert!(LinkError::ConnectTimeout(Duration::from_secs(30)).is_connection_error());
        assert!(LinkError::subscribe("dev/A10/x/base/result", "failure").is_connection_error());
        assert!(!LinkError::connect("refused").is_persistence_error());
    }

    #[test]
    fn test_persistence_error_from_repository_error() {
        let err = LinkError::from(RepositoryError::NotFound("CPU123".to_string()));
        assert!(err.is_persistence_error());
        assert!(!err.is_connection_error());
        assert_eq!(
            err.to_string(),
            "device record persistence failed: no device record for 'CPU123'"
        );
    }
}
