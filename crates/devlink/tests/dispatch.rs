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

// tests/dispatch.rs
// Inbound message handling: auth results, binding and unbinding notices,
// unknown codes and malformed payloads.

mod common;

use common::{DEVICE_ID, Harness, binding_message, eventually};
use devlink::{ConnectionState, LinkEvent};

#[tokio::test]
async fn test_auth_allow_stores_token() {
    let harness = Harness::start().await;
    harness
        .dispatch(r#"{"code":1,"msg":"ok","data":{"deviceId":"CPU123","result":"allow","token":"tok-1"}}"#)
        .await;

    let record = harness.repository.record(DEVICE_ID).unwrap();
    assert_eq!(record.token.as_deref(), Some("tok-1"));
    assert_eq!(
        harness.binding.snapshot().await.auth_token.as_deref(),
        Some("tok-1")
    );
}

#[tokio::test]
async fn test_auth_deny_leaves_token_unset() {
    let harness = Harness::start().await;
    harness
        .dispatch(r#"{"code":1,"data":{"deviceId":"CPU123","result":"deny","token":"tok-1"}}"#)
        .await;
    harness.dispatch(r#"{"code":1,"data":null}"#).await;

    assert_eq!(harness.repository.record(DEVICE_ID).unwrap().token, None);
    assert_eq!(harness.binding.snapshot().await.auth_token, None);
}

#[tokio::test]
async fn test_binding_uses_own_device_id() {
    let harness = Harness::start().await;
    harness.dispatch(&binding_message("T1", "U1", "X")).await;

    let record = harness.repository.record(DEVICE_ID).unwrap();
    assert_eq!(record.tenant_id.as_deref(), Some("T1"));
    assert_eq!(record.user_id.as_deref(), Some("U1"));
    assert!(harness.repository.record("X").is_none());
    assert!(harness.binding.is_bound().await);
}

#[tokio::test]
async fn test_binding_sends_exactly_one_bind_report() {
    let harness = Harness::start().await;
    assert!(!harness.binding.is_bound().await);

    harness.dispatch(&binding_message("T1", "U1", DEVICE_ID)).await;

    let published = harness.link.published();
    assert_eq!(published.len(), 1);
    let (topic, report) = &published[0];
    assert_eq!(topic, "dev/RK3562/CPU123/T1/U1/base/status");
    assert_eq!(report["lt"], "bind");
    assert_eq!(report["dId"], DEVICE_ID);
    assert_eq!(report["tId"], "T1");
    assert_eq!(report["uId"], "U1");
}

#[tokio::test]
async fn test_unbinding_clears_binding() {
    let harness = Harness::start().await;
    harness.dispatch(&binding_message("T1", "U1", DEVICE_ID)).await;
    harness.dispatch(r#"{"code":3,"msg":"unbind","data":{}}"#).await;

    let record = harness.repository.record(DEVICE_ID).unwrap();
    assert_eq!(record.tenant_id, None);
    assert_eq!(record.user_id, None);
    assert!(!harness.binding.is_bound().await);

    // The unbind confirmation has no status topic left to go to.
    assert_eq!(harness.link.published_log_types(), vec!["bind"]);
    assert_eq!(harness.coordinator.stats().total_skipped, 1);
}

#[tokio::test]
async fn test_unknown_and_missing_codes_are_ignored() {
    let harness = Harness::start().await;
    harness.dispatch(r#"{"code":42,"data":{"tenantId":"T1","userId":"U1"}}"#).await;
    harness.dispatch(r#"{"msg":"no code","data":{"tenantId":"T1","userId":"U1"}}"#).await;
    harness.dispatch(r#"{"code":"bind","data":{"tenantId":"T1","userId":"U1"}}"#).await;

    assert!(!harness.binding.is_bound().await);
    assert_eq!(harness.link.publish_count(), 0);
}

#[tokio::test]
async fn test_string_code_and_numeric_fields_bind() {
    let harness = Harness::start().await;
    harness
        .dispatch(
            r#"{"code":"2","msg":"bind","time":20240311101500,"timestamp":1710152100,
                "data":{"tenantId":"T1","userId":7,"deviceModel":"RK3562","deviceId":"CPU123"}}"#,
        )
        .await;

    let record = harness.repository.record(DEVICE_ID).unwrap();
    assert_eq!(record.tenant_id.as_deref(), Some("T1"));
    assert_eq!(record.user_id.as_deref(), Some("7"));
    assert_eq!(harness.link.published_log_types(), vec!["bind"]);

    harness.dispatch(r#"{"code":3.0,"timestamp":1710152200,"data":{}}"#).await;
    assert!(!harness.binding.is_bound().await);
}

#[tokio::test]
async fn test_binding_persistence_failure_sends_nothing() {
    let harness = Harness::start().await;
    harness.repository.set_unavailable(true);

    harness.dispatch(&binding_message("T1", "U1", DEVICE_ID)).await;
    harness
        .dispatch(r#"{"code":1,"data":{"result":"allow","token":"tok-1"}}"#)
        .await;

    assert!(!harness.binding.is_bound().await);
    assert_eq!(harness.binding.snapshot().await.auth_token, None);
    assert_eq!(harness.link.publish_count(), 0);
    assert_eq!(harness.coordinator.stats().total_published, 0);

    // Once storage is back the next notices go through.
    harness.repository.set_unavailable(false);
    harness.dispatch(&binding_message("T1", "U1", DEVICE_ID)).await;
    harness
        .dispatch(r#"{"code":1,"data":{"result":"allow","token":"tok-1"}}"#)
        .await;

    assert!(harness.binding.is_bound().await);
    assert_eq!(
        harness.repository.record(DEVICE_ID).unwrap().token.as_deref(),
        Some("tok-1")
    );
    assert_eq!(harness.link.published_log_types(), vec!["bind"]);
}

#[tokio::test]
async fn test_persistence_failure_does_not_stop_dispatch_loop() {
    let harness = Harness::start().await;
    harness.repository.set_unavailable(true);
    harness
        .events
        .send(LinkEvent::Message {
            topic: common::RESULT_TOPIC.to_string(),
            payload: binding_message("T1", "U1", DEVICE_ID).into_bytes(),
        })
        .unwrap();
    harness
        .events
        .send(LinkEvent::Message {
            topic: common::RESULT_TOPIC.to_string(),
            payload: br#"{"code":3,"data":{}}"#.to_vec(),
        })
        .unwrap();

    // Give the loop time to drain both failures before storage returns.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    harness.repository.set_unavailable(false);
    harness
        .events
        .send(LinkEvent::Message {
            topic: common::RESULT_TOPIC.to_string(),
            payload: binding_message("T2", "U2", DEVICE_ID).into_bytes(),
        })
        .unwrap();

    let repository = harness.repository.clone();
    assert!(
        eventually(|| {
            repository
                .record(DEVICE_ID)
                .and_then(|record| record.tenant_id)
                .as_deref()
                == Some("T2")
        })
        .await
    );
    assert_eq!(harness.link.published_log_types(), vec!["bind"]);
}

#[tokio::test]
async fn test_malformed_binding_data_is_dropped() {
    let harness = Harness::start().await;
    harness.dispatch(r#"{"code":2,"data":{"tenantId":"T1"}}"#).await;
    harness.dispatch(r#"{"code":2,"data":"T1/U1"}"#).await;

    assert!(!harness.binding.is_bound().await);
    assert_eq!(harness.link.publish_count(), 0);
}

#[tokio::test]
async fn test_malformed_message_does_not_block_dispatch_loop() {
    let harness = Harness::start().await;
    assert_eq!(harness.coordinator.state(), ConnectionState::Subscribed);

    for payload in [&b"not json"[..], &b"{\"code\":"[..], &[0xff, 0xfe][..]] {
        harness
            .events
            .send(LinkEvent::Message {
                topic: common::RESULT_TOPIC.to_string(),
                payload: payload.to_vec(),
            })
            .unwrap();
    }
    harness
        .events
        .send(LinkEvent::Message {
            topic: common::RESULT_TOPIC.to_string(),
            payload: binding_message("T1", "U1", DEVICE_ID).into_bytes(),
        })
        .unwrap();

    let repository = harness.repository.clone();
    assert!(
        eventually(|| {
            repository
                .record(DEVICE_ID)
                .is_some_and(|record| record.is_bound())
        })
        .await
    );
    assert!(eventually(|| harness.link.publish_count() == 1).await);
}
