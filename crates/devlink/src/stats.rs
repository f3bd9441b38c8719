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

// src/stats.rs
// Status publish statistics.
//
// Lock-free counters so that the heartbeat, lifecycle and dispatch paths
// can all record outcomes without contending with each other.

use std::sync::atomic::{AtomicUsize, Ordering};

// PublishStats stores a snapshot of status publish outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishStats {
    // total_published is the count of reports handed to the broker
    // link since startup/reset.
    pub total_published: usize,
    // total_failed is the count of reports the broker link refused.
    pub total_failed: usize,
    // total_skipped is the count of reports dropped because the link
    // wasn't subscribed or the device wasn't bound.
    pub total_skipped: usize,
    // total_bytes_published is the payload size of everything
    // successfully published.
    pub total_bytes_published: usize,
}

// PublishStatsTracker is owned by the coordinator and shared by
// reference with anything that needs a snapshot.
#[derive(Debug, Default)]
pub struct PublishStatsTracker {
    published_count: AtomicUsize,
    failed_count: AtomicUsize,
    skipped_count: AtomicUsize,
    published_bytes: AtomicUsize,
}

impl PublishStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // increment_published records a report the link accepted
    // (e.g. increment_published(212) for a 212-byte payload).
    pub fn increment_published(&self, bytes: usize) {
        self.published_count.fetch_add(1, Ordering::Relaxed);
        self.published_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_counters(&self) {
        self.published_count.store(0, Ordering::Relaxed);
        self.failed_count.store(0, Ordering::Relaxed);
        self.skipped_count.store(0, Ordering::Relaxed);
        self.published_bytes.store(0, Ordering::Relaxed);
    }

    // to_stats creates an immutable snapshot of the current counters.
    pub fn to_stats(&self) -> PublishStats {
        PublishStats {
            total_published: self.published_count.load(Ordering::Relaxed),
            total_failed: self.failed_count.load(Ordering::Relaxed),
            total_skipped: self.skipped_count.load(Ordering::Relaxed),
            total_bytes_published: self.published_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let tracker = PublishStatsTracker::new();
        tracker.increment_published(200);
        tracker.increment_published(50);
        tracker.increment_failed();
        tracker.increment_skipped();
        tracker.increment_skipped();

        assert_eq!(
            tracker.to_stats(),
            PublishStats {
                total_published: 2,
                total_failed: 1,
                total_skipped: 2,
                total_bytes_published: 250,
            }
        );

        tracker.reset_counters();
        assert_eq!(tracker.to_stats(), PublishStats::default());
    }

    #[test]
    fn test_concurrent_updates() {
        let tracker = Arc::new(PublishStatsTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.increment_published(10);
                        tracker.increment_skipped();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = tracker.to_stats();
        assert_eq!(stats.total_published, 800);
        assert_eq!(stats.total_skipped, 800);
        assert_eq!(stats.total_bytes_published, 8000);
    }
}
