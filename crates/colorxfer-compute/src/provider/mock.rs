//! Hardware-independent provider for selection tests.

use std::collections::HashSet;

use super::DeviceProvider;
use crate::discovery::{vendor_name, DeviceClass, DeviceId, DeviceInfo, PlatformInfo};
use crate::{ComputeError, ComputeResult};

/// Opened mock device: just remembers which descriptor it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Id of the descriptor this handle was opened from.
    pub id: DeviceId,
}

/// Provider serving a fixed list of fabricated platforms.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    platforms: Vec<(String, Vec<(String, u32, DeviceClass)>)>,
    broken: HashSet<DeviceId>,
}

impl MockProvider {
    /// Empty provider (no platforms).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a platform with `(device name, PCI vendor id, class)` entries.
    pub fn platform(mut self, name: &str, devices: &[(&str, u32, DeviceClass)]) -> Self {
        self.platforms.push((
            name.to_string(),
            devices
                .iter()
                .map(|(n, v, c)| (n.to_string(), *v, *c))
                .collect(),
        ));
        self
    }

    /// Make `open` fail for the given device id.
    pub fn fail_open(mut self, id: usize) -> Self {
        self.broken.insert(DeviceId(id));
        self
    }
}

impl DeviceProvider for MockProvider {
    type Device = MockDevice;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn enumerate(&mut self) -> Vec<PlatformInfo> {
        let mut next_id = 0;
        self.platforms
            .iter()
            .map(|(name, devices)| PlatformInfo {
                name: name.clone(),
                devices: devices
                    .iter()
                    .map(|(device_name, vendor_id, class)| {
                        let id = DeviceId(next_id);
                        next_id += 1;
                        DeviceInfo {
                            id,
                            name: device_name.clone(),
                            vendor_id: *vendor_id,
                            vendor: vendor_name(*vendor_id).to_string(),
                            class: *class,
                            device_type: format!("{class:?}"),
                            driver: "mock".to_string(),
                            max_image_dimension: 8192,
                            max_buffer_size: 256 << 20,
                            max_workgroup_invocations: 256,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    fn open(&self, device: &DeviceInfo) -> ComputeResult<MockDevice> {
        if self.broken.contains(&device.id) {
            return Err(ComputeError::DeviceCreation(format!("{} refused to open", device.name)));
        }
        Ok(MockDevice { id: device.id })
    }
}
