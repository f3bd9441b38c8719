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

// src/credentials.rs
// Time-windowed broker credentials derived from the device id.
//
// The broker recomputes the same formula over the same clock minute, so
// there is no stored secret: the client id rotates monthly and the password
// every minute. Both are evaluated in device local time.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use sha2::{Digest, Sha256};

const CLIENT_ID_TIME_FORMAT: &str = "%Y%m";
const PASSWORD_TIME_FORMAT: &str = "%Y%m%d%H%M";

// Credentials are what a single connect attempt presents to the broker.
// They are only valid within the minute they were derived in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

// Keep the password out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `{device_id}_{YYYYMM}`
pub fn derive_client_id<Tz>(device_id: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{device_id}_{}", now.format(CLIENT_ID_TIME_FORMAT))
}

/// Lowercase hex SHA-256 of `{device_id}{YYYYMMDDHHmm}`.
pub fn derive_password<Tz>(device_id: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let plain = format!("{device_id}{}", now.format(PASSWORD_TIME_FORMAT));
    hex::encode(Sha256::digest(plain.as_bytes()))
}

pub fn derive<Tz>(device_id: &str, now: &DateTime<Tz>) -> Credentials
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    Credentials {
        client_id: derive_client_id(device_id, now),
        username: device_id.to_string(),
        password: derive_password(device_id, now),
    }
}

// derive_now is what connect and reconnect attempts call.
pub fn derive_now(device_id: &str) -> Credentials {
    derive(device_id, &Local::now())
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, Utc};

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_fixture_values() {
        let now = at(2024, 3, 11, 10, 15, 0);
        assert_eq!(derive_client_id("CPU123", &now), "CPU123_202403");
        assert_eq!(
            derive_password("CPU123", &now),
            "06180818b9ec013a6911dc53625973d8112ffbebfafceeb8e5dfe5712e4d2245"
        );
    }

    #[test]
    fn test_password_stable_within_minute() {
        let early = at(2024, 3, 11, 10, 15, 0);
        let late = at(2024, 3, 11, 10, 15, 59);
        assert_eq!(derive_password("CPU123", &early), derive_password("CPU123", &late));
        assert_eq!(derive("CPU123", &early), derive("CPU123", &late));
    }

    #[test]
    fn test_password_changes_across_minutes() {
        let t1 = at(2024, 3, 11, 10, 15, 59);
        let t2 = at(2024, 3, 11, 10, 16, 0);
        assert_ne!(derive_password("CPU123", &t1), derive_password("CPU123", &t2));
        assert_eq!(
            derive_password("CPU123", &t2),
            "2106be72af2a8582f9fb14bd51445433f36d3efdac6c8205080100150884250c"
        );
        // Same month, so the client id doesn't move.
        assert_eq!(derive_client_id("CPU123", &t1), derive_client_id("CPU123", &t2));
    }

    #[test]
    fn test_client_id_rotates_monthly() {
        let march = at(2024, 3, 31, 23, 59, 0);
        let april = at(2024, 4, 1, 0, 0, 0);
        assert_eq!(derive_client_id("CPU123", &march), "CPU123_202403");
        assert_eq!(derive_client_id("CPU123", &april), "CPU123_202404");
    }

    #[test]
    fn test_formatting_uses_the_given_offset() {
        // 2024-03-11T10:15 at +08:00 is 02:15 UTC; the wall clock is what counts.
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 11, 10, 15, 0).unwrap();
        assert_eq!(
            derive_password("CPU123", &local),
            derive_password("CPU123", &at(2024, 3, 11, 10, 15, 0))
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = derive("CPU123", &at(2024, 3, 11, 10, 15, 0));
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("CPU123_202403"));
        assert!(!rendered.contains(&creds.password));
    }
}
