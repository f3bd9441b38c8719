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

// src/lib.rs
// Device link agent core: broker connection lifecycle, credential
// derivation, inbound dispatch, binding state and status reporting.

pub mod binding;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod envelope;
pub mod errors;
pub mod gate;
pub mod identity;
pub mod report;
pub mod reporter;
pub mod repository;
pub mod stats;
pub mod transport;

// Export some things for convenience.
pub use binding::{BindingStore, DeviceBindingState};
pub use config::LinkAgentConfig;
pub use coordinator::{
    BindingSink, ConnectionState, LinkCoordinator, LinkStatus, PublishOutcome, SkipReason,
};
pub use credentials::Credentials;
pub use errors::{LinkError, RepositoryError};
pub use gate::ReadinessGate;
pub use identity::{DeviceIdentity, IdentityProvider};
pub use report::{LogType, StatusReport};
pub use reporter::{StatusPublisher, StatusReporter};
pub use repository::{DeviceRecord, DeviceRepository, JsonFileRepository, MemoryRepository};
pub use rumqttc::QoS;
pub use stats::PublishStats;
pub use transport::{BrokerEndpoint, BrokerLink, LinkEvent, MqttLink};
