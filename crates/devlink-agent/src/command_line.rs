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

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(name = "devlink-agent")]
pub struct Options {
    /// The path to the agent configuration file.
    /// This file will hold data in the `LinkAgentConfig` format.
    /// Built-in defaults are used when it is not given.
    #[clap(long)]
    pub config_path: Option<PathBuf>,

    #[clap(subcommand)]
    pub cmd: Option<AgentCommand>,
}

#[derive(Parser, Debug, PartialEq, Eq)]
pub enum AgentCommand {
    #[clap(about = "Run is the normal command. Keeps the broker link up and reports until terminated.")]
    Run,

    #[clap(about = "Print the probed device identity and its stored record as JSON")]
    Identity,

    #[clap(about = "Print the broker credentials a connect attempt would use right now")]
    Credentials,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_config() {
        let options =
            Options::try_parse_from(["devlink-agent", "--config-path", "/etc/devlink/config.toml", "run"])
                .unwrap();
        assert_eq!(
            options.config_path,
            Some(PathBuf::from("/etc/devlink/config.toml"))
        );
        assert_eq!(options.cmd, Some(AgentCommand::Run));
    }

    #[test]
    fn test_parse_without_command() {
        let options = Options::try_parse_from(["devlink-agent"]).unwrap();
        assert!(options.config_path.is_none());
        assert!(options.cmd.is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(Options::try_parse_from(["devlink-agent", "serve"]).is_err());
    }
}
