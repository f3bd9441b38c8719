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

use std::sync::Once;

use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_SETUP: Once = Once::new();

/// Initialize global logging output to STDERR. Applies to all threads.
/// Use `export RUST_LOG=trace|debug|info|warn|error` to change log level.
///
/// STDOUT is left for the JSON printed by the `identity` and
/// `credentials` commands.
pub fn init_logging() -> eyre::Result<()> {
    let mut result = Ok(());
    LOG_SETUP.call_once(|| {
        result = subscriber().and_then(|subscriber| {
            subscriber
                .try_init()
                .map_err(|e| eyre::eyre!("tracing_subscriber setup failed: {e}"))
        });
    });
    result
}

// A logging subscriber for use on the current thread.
// Usually you want `init_logging()` instead.
//
// Usage: `let guard = subscriber()?.set_default()`
// Subscriber is unregistered when guard is dropped.
pub fn subscriber() -> eyre::Result<impl SubscriberInitExt> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("rumqttc=warn".parse()?)
        .add_directive("rustls=warn".parse()?);
    let stderr_formatter = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    Ok(tracing_subscriber::registry().with(stderr_formatter.with_filter(env_filter)))
}
