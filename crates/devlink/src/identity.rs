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

// src/identity.rs
// Device identity: the stable id and model name the whole link is keyed on.

use serde::{Deserialize, Serialize};

// DeviceIdentity is fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    pub model: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            model: model.into(),
        }
    }
}

// IdentityProvider is implemented by whatever knows how to probe the
// hardware. It is consulted exactly once at startup.
pub trait IdentityProvider {
    fn identify(&self) -> DeviceIdentity;
}

// DeviceIdentity provides itself, which covers config overrides and tests.
impl IdentityProvider for DeviceIdentity {
    fn identify(&self) -> DeviceIdentity {
        self.clone()
    }
}
