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

use devlink::config::LinkAgentConfig;
use devlink::{DeviceRepository, IdentityProvider, JsonFileRepository, credentials};
use eyre::WrapErr;

pub use command_line::{AgentCommand, Options};
pub use identity::HardwareIdentity;
pub use logging::init_logging;

mod command_line;
mod identity;
mod logging;
mod main_loop;

pub async fn start(cmdline: command_line::Options) -> eyre::Result<()> {
    let (agent, path) = match cmdline.config_path {
        // built-in defaults
        None => (LinkAgentConfig::default(), "default".to_string()),
        Some(config_path) => (
            LinkAgentConfig::load_from(&config_path).wrap_err(format!(
                "Error loading agent configuration from {}",
                config_path.display()
            ))?,
            config_path.display().to_string(),
        ),
    };
    tracing::info!("Using configuration from {path}: {agent:?}");

    match cmdline.cmd {
        None => {
            tracing::error!("Missing cmd. Try `devlink-agent --help`");
        }

        Some(AgentCommand::Run) => {
            main_loop::setup_and_run(agent)
                .await
                .wrap_err("main_loop error exit")?;
            tracing::info!("Agent exit");
        }

        Some(AgentCommand::Identity) => {
            let identity = HardwareIdentity::from_config(&agent).identify();
            let repository = JsonFileRepository::new(&agent.device.store_path);
            let record = repository
                .get_or_create(&identity.device_id, &identity.model)
                .wrap_err(format!(
                    "Error reading device record from {}",
                    agent.device.store_path.display()
                ))?;
            let out = serde_json::json!({
                "identity": identity,
                "record": record,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Some(AgentCommand::Credentials) => {
            let identity = HardwareIdentity::from_config(&agent).identify();
            let credentials = credentials::derive_now(&identity.device_id);
            let out = serde_json::json!({
                "clientId": credentials.client_id,
                "username": credentials.username,
                "password": credentials.password,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
