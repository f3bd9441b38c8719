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

// src/transport/endpoint.rs
// Broker URL parsing.

use std::fmt;

use url::Url;

use crate::errors::LinkError;

const DEFAULT_PLAIN_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

// BrokerEndpoint is where to connect and whether to use TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl BrokerEndpoint {
    // parse accepts ssl://, mqtts:// and tls:// for TLS, and tcp:// and
    // mqtt:// for plain connections. The port defaults per scheme.
    pub fn parse(server_url: &str) -> Result<Self, LinkError> {
        let url = Url::parse(server_url)
            .map_err(|e| LinkError::invalid_server_url(server_url, e.to_string()))?;

        let secure = match url.scheme() {
            "ssl" | "mqtts" | "tls" => true,
            "tcp" | "mqtt" => false,
            other => {
                return Err(LinkError::invalid_server_url(
                    server_url,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LinkError::invalid_server_url(server_url, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = url.port().unwrap_or(if secure {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        });

        Ok(Self { host, port, secure })
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "ssl" } else { "tcp" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}
