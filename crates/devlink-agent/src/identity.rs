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

// Hardware probe for the device id.
//
// Order: cpuinfo `Serial`, then `CPU<processor>` from the first processor
// entry, then the first active non-loopback MAC address as uppercase hex,
// then UNKNOWN_DEVICE. A configured id wins over all of them.

use std::path::{Path, PathBuf};

use devlink::config::LinkAgentConfig;
use devlink::{DeviceIdentity, IdentityProvider};

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";

pub struct HardwareIdentity {
    model: String,
    id_override: Option<String>,
    cpuinfo_path: PathBuf,
}

impl HardwareIdentity {
    pub fn from_config(config: &LinkAgentConfig) -> Self {
        Self {
            model: config.link.device_model.clone(),
            id_override: config.device.id.clone().filter(|id| !id.trim().is_empty()),
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
        }
    }

    fn probe_device_id(&self) -> String {
        if let Some(id) = &self.id_override {
            tracing::info!(device_id = %id, "Using configured device id");
            return id.clone();
        }
        if let Some(id) = read_cpuinfo(&self.cpuinfo_path).and_then(|c| device_id_from_cpuinfo(&c)) {
            return id;
        }
        if let Some(id) = device_id_from_mac() {
            tracing::info!(device_id = %id, "No cpu serial found, using MAC address as device id");
            return id;
        }
        tracing::error!("Could not determine a device id, using {UNKNOWN_DEVICE}");
        UNKNOWN_DEVICE.to_string()
    }
}

impl IdentityProvider for HardwareIdentity {
    fn identify(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.probe_device_id(), self.model.clone())
    }
}

fn read_cpuinfo(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Couldn't read cpuinfo");
            None
        }
    }
}

/// Extracts a device id from /proc/cpuinfo contents.
pub fn device_id_from_cpuinfo(cpuinfo: &str) -> Option<String> {
    // Lines look like `Serial		: 6b2f8f5e1a0c3d47`
    let field = |name: &str| {
        cpuinfo.lines().find_map(|line| match line.split_once(':') {
            Some((key, value)) if key.trim() == name && !value.trim().is_empty() => {
                Some(value.trim().to_string())
            }
            _ => None,
        })
    };

    field("Serial").or_else(|| field("processor").map(|processor| format!("CPU{processor}")))
}

fn device_id_from_mac() -> Option<String> {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => Some(mac_to_device_id(&mac.bytes())),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Couldn't read MAC address");
            None
        }
    }
}

fn mac_to_device_id(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM_CPUINFO: &str = "processor\t: 0\nBogoMIPS\t: 48.00\nFeatures\t: fp asimd\n\n\
processor\t: 1\nBogoMIPS\t: 48.00\n\nSerial\t\t: 6b2f8f5e1a0c3d47\n";

    const X86_CPUINFO: &str = "processor\t: 3\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Xeon(R)\n\n\
processor\t: 4\nvendor_id\t: GenuineIntel\n";

    #[test]
    fn test_serial_wins() {
        assert_eq!(
            device_id_from_cpuinfo(ARM_CPUINFO).as_deref(),
            Some("6b2f8f5e1a0c3d47")
        );
    }

    #[test]
    fn test_first_processor_without_serial() {
        assert_eq!(device_id_from_cpuinfo(X86_CPUINFO).as_deref(), Some("CPU3"));
    }

    #[test]
    fn test_empty_serial_is_skipped() {
        let cpuinfo = "Serial\t\t: \nprocessor\t: 0\n";
        assert_eq!(device_id_from_cpuinfo(cpuinfo).as_deref(), Some("CPU0"));
    }

    #[test]
    fn test_nothing_usable() {
        assert_eq!(device_id_from_cpuinfo("vendor_id\t: GenuineIntel\n"), None);
        assert_eq!(device_id_from_cpuinfo(""), None);
    }

    #[test]
    fn test_mac_to_device_id() {
        assert_eq!(
            mac_to_device_id(&[0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]),
            "0A1B2C3D4E5F"
        );
    }

    #[test]
    fn test_configured_id_wins() {
        let mut config = LinkAgentConfig::default();
        config.device.id = Some("CPU123".to_string());
        config.link.device_model = "RV1126".to_string();

        let identity = HardwareIdentity::from_config(&config).identify();
        assert_eq!(identity, DeviceIdentity::new("CPU123", "RV1126"));
    }

    #[test]
    fn test_cpuinfo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpuinfo");
        std::fs::write(&path, X86_CPUINFO).unwrap();

        let provider = HardwareIdentity {
            model: "RK3562".to_string(),
            id_override: None,
            cpuinfo_path: path,
        };
        assert_eq!(provider.identify().device_id, "CPU3");
    }
}
