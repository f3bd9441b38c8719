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

// src/gate.rs
// One-shot readiness gate: released by the first successful
// connect-and-subscribe, observed by any number of waiters.

use std::time::Duration;

use tokio::sync::watch;

/// ReadinessGate is a single-assignment flag with many subscribers.
///
/// Once released it stays released for the life of the process; later
/// reconnects don't re-arm it. Waiting with a timeout never cancels the
/// work that would release the gate.
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// release opens the gate. Returns true only for the call that
    /// actually opened it.
    pub fn release(&self) -> bool {
        self.tx.send_if_modified(|released| {
            if *released {
                false
            } else {
                *released = true;
                true
            }
        })
    }

    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    /// wait blocks until the gate is released or `timeout` elapses.
    /// Returns whether the gate is released.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for can only fail if self is
        // gone, which the borrow rules out.
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|released| *released)).await,
            Ok(Ok(_))
        )
    }
}
