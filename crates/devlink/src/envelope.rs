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

// src/envelope.rs
// Inbound envelopes from the per-device result topic.
//
// The broker wraps everything as {code, msg, time, timestamp, data}. The
// numeric code is translated into a typed Inbound variant here, at the
// edge, so the dispatch logic never looks at raw codes or JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::EnvelopeError;

pub const CODE_AUTH_RESULT: i64 = 1;
pub const CODE_BINDING: i64 = 2;
pub const CODE_UNBINDING: i64 = 3;

const AUTH_ALLOW: &str = "allow";

// InboundEnvelope is the outer wire shape. Only `code` and `data` drive
// behavior; the rest is kept for logging.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: Value,
}

// code_from_value reads a code the forgiving way: numbers (truncated),
// numeric strings and booleans all count. Anything else is 0, which routes
// to Inbound::Unknown.
fn code_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn lenient_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(code_from_value(&value))
}

// Text fields accept any scalar; numbers and booleans keep their JSON
// spelling. Arrays and objects are rejected.
fn scalar_text<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => {
            Err(E::custom("expected a string, found a structure"))
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    scalar_text(Value::deserialize(deserializer)?)
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    scalar_text::<D::Error>(Value::deserialize(deserializer)?)?
        .ok_or_else(|| serde::de::Error::custom("expected a string, found null"))
}

// AuthResult is the data payload of code 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    #[serde(default, deserialize_with = "lenient_text")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
}

impl AuthResult {
    // allowed_token returns the token when the broker allowed the device.
    pub fn allowed_token(&self) -> Option<&str> {
        match self.result.as_deref() {
            Some(AUTH_ALLOW) => self.token.as_deref(),
            _ => None,
        }
    }
}

// BindingNotice is the data payload of code 2. The payload's device_id is
// parsed for logging only and must never be used as a key.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingNotice {
    #[serde(deserialize_with = "required_text")]
    pub tenant_id: String,
    #[serde(deserialize_with = "required_text")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub device_model: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub env: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub device_id: Option<String>,
}

// Inbound is the typed form of an envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Auth(AuthResult),
    Binding(BindingNotice),
    Unbinding,
    Unknown(i64),
}

impl Inbound {
    pub fn parse(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: InboundEnvelope =
            serde_json::from_slice(payload).map_err(EnvelopeError::InvalidJson)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: InboundEnvelope) -> Result<Self, EnvelopeError> {
        let code = envelope.code;
        let invalid = |source| EnvelopeError::InvalidData { code, source };
        match code {
            CODE_AUTH_RESULT => {
                // A null data block is a denial, not a parse failure.
                let auth = if envelope.data.is_null() {
                    AuthResult::default()
                } else {
                    serde_json::from_value(envelope.data).map_err(invalid)?
                };
                Ok(Self::Auth(auth))
            }
            CODE_BINDING => Ok(Self::Binding(
                serde_json::from_value(envelope.data).map_err(invalid)?,
            )),
            CODE_UNBINDING => Ok(Self::Unbinding),
            other => Ok(Self::Unknown(other)),
        }
    }
}
