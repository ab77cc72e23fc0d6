//! wgpu-backed provider.
//!
//! Every wgpu backend compiled in is one platform; every adapter it reports
//! is one device. Opening a device requests a wgpu `Device` + `Queue` pair
//! with the adapter's full limits.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::DeviceProvider;
use crate::discovery::{vendor_name, DeviceClass, DeviceId, DeviceInfo, PlatformInfo};
use crate::{ComputeError, ComputeResult};

/// Opened wgpu device with its submission queue.
#[derive(Clone)]
pub struct WgpuDevice {
    /// Descriptor the device was opened from.
    pub id: DeviceId,
    /// Logical device.
    pub device: Arc<wgpu::Device>,
    /// The device's queue.
    pub queue: Arc<wgpu::Queue>,
    /// Limits granted at creation.
    pub limits: wgpu::Limits,
}

impl WgpuDevice {
    /// True if both handles refer to the same logical device.
    pub fn same_device(&self, other: &WgpuDevice) -> bool {
        Arc::ptr_eq(&self.device, &other.device)
    }

    /// Run `f` inside a validation error scope and return the captured error.
    pub(crate) fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let err = pollster::block_on(self.device.pop_error_scope());
        (value, err)
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("id", &self.id)
            .field("max_texture_dimension_2d", &self.limits.max_texture_dimension_2d)
            .finish()
    }
}

/// Provider enumerating real adapters through wgpu.
pub struct WgpuProvider {
    instance: wgpu::Instance,
    backends: wgpu::Backends,
    adapters: Vec<(DeviceId, wgpu::Adapter)>,
}

impl WgpuProvider {
    /// Provider over every backend, or the ones named in `COLORXFER_BACKENDS`.
    pub fn new() -> Self {
        let backends = std::env::var("COLORXFER_BACKENDS")
            .ok()
            .and_then(|list| parse_backends(&list))
            .unwrap_or_else(wgpu::Backends::all);
        Self::with_backends(backends)
    }

    /// Provider restricted to the given backends.
    pub fn with_backends(backends: wgpu::Backends) -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        Self {
            instance,
            backends,
            adapters: Vec::new(),
        }
    }
}

impl Default for WgpuProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProvider for WgpuProvider {
    type Device = WgpuDevice;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn enumerate(&mut self) -> Vec<PlatformInfo> {
        self.adapters.clear();
        let mut platforms: Vec<PlatformInfo> = Vec::new();

        for adapter in self.instance.enumerate_adapters(self.backends) {
            let info = adapter.get_info();
            let limits = adapter.limits();
            let id = DeviceId(self.adapters.len());
            let platform_name = format!("{:?}", info.backend);

            let driver = match (info.driver.is_empty(), info.driver_info.is_empty()) {
                (false, false) => format!("{} {}", info.driver, info.driver_info),
                (false, true) => info.driver.clone(),
                _ => info.driver_info.clone(),
            };

            let device = DeviceInfo {
                id,
                name: info.name.clone(),
                vendor_id: info.vendor,
                vendor: vendor_name(info.vendor).to_string(),
                class: DeviceClass::from_device_type(info.device_type),
                device_type: format!("{:?}", info.device_type),
                driver,
                max_image_dimension: limits.max_texture_dimension_2d,
                max_buffer_size: limits.max_buffer_size,
                max_workgroup_invocations: limits.max_compute_invocations_per_workgroup,
            };
            debug!(device = %device, platform = %platform_name, "Found adapter");

            match platforms.iter_mut().find(|p| p.name == platform_name) {
                Some(platform) => platform.devices.push(device),
                None => platforms.push(PlatformInfo {
                    name: platform_name,
                    devices: vec![device],
                }),
            }
            self.adapters.push((id, adapter));
        }

        platforms
    }

    fn open(&self, device: &DeviceInfo) -> ComputeResult<WgpuDevice> {
        let adapter = self
            .adapters
            .iter()
            .find(|(id, _)| *id == device.id)
            .map(|(_, a)| a)
            .ok_or_else(|| ComputeError::NotFound {
                kind: "device",
                name: device.id.to_string(),
            })?;

        let limits = adapter.limits();
        let (raw_device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(device.name.as_str()),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| ComputeError::DeviceCreation(format!("{}: {e}", device.name)))?;

        let name = device.name.clone();
        raw_device.on_uncaptured_error(Box::new(move |err| {
            error!(device = %name, "Uncaptured device error: {err}");
        }));

        Ok(WgpuDevice {
            id: device.id,
            device: Arc::new(raw_device),
            queue: Arc::new(queue),
            limits,
        })
    }
}

/// Parse a comma separated backend list ("vulkan,gl").
fn parse_backends(list: &str) -> Option<wgpu::Backends> {
    let mut backends = wgpu::Backends::empty();
    for name in list.split(',').map(|s| s.trim().to_ascii_lowercase()) {
        match name.as_str() {
            "" => {}
            "vulkan" | "vk" => backends |= wgpu::Backends::VULKAN,
            "metal" | "mtl" => backends |= wgpu::Backends::METAL,
            "dx12" | "d3d12" => backends |= wgpu::Backends::DX12,
            "gl" | "opengl" | "gles" => backends |= wgpu::Backends::GL,
            other => warn!("Ignoring unknown backend '{other}' in COLORXFER_BACKENDS"),
        }
    }
    (!backends.is_empty()).then_some(backends)
}
