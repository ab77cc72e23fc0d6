//! Platform and device discovery.
//!
//! A *platform* is one graphics API backend (Vulkan, Metal, DX12, GL) and a
//! *device* is an adapter exposed by that backend. Descriptors are collected
//! once by [`crate::ResourceManager::discover`] and never change afterwards.

use std::fmt;

/// Broad class of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceClass {
    /// Software rasterizer / CPU implementation.
    Cpu,
    /// Discrete, integrated or virtual GPU.
    Gpu,
    /// Anything the driver could not classify. Never matched by a query.
    Other,
}

impl DeviceClass {
    /// Lowercase name used in registry keys and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Other => "other",
        }
    }

    /// Classify a wgpu device type.
    pub fn from_device_type(device_type: wgpu::DeviceType) -> Self {
        match device_type {
            wgpu::DeviceType::Cpu => Self::Cpu,
            wgpu::DeviceType::DiscreteGpu
            | wgpu::DeviceType::IntegratedGpu
            | wgpu::DeviceType::VirtualGpu => Self::Gpu,
            wgpu::DeviceType::Other => Self::Other,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!("unknown device class '{other}' (expected cpu or gpu)")),
        }
    }
}

/// Stable identifier of a discovered device (index in discovery order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only descriptor of one compute device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Discovery-order identifier.
    pub id: DeviceId,
    /// Adapter name as reported by the driver.
    pub name: String,
    /// PCI vendor id (0 if unknown).
    pub vendor_id: u32,
    /// Human-readable vendor name derived from `vendor_id`.
    pub vendor: String,
    /// Device class used for query matching.
    pub class: DeviceClass,
    /// Driver-reported device type, for display.
    pub device_type: String,
    /// Driver name and version.
    pub driver: String,
    /// Largest supported 2D image dimension.
    pub max_image_dimension: u32,
    /// Largest supported buffer, in bytes.
    pub max_buffer_size: u64,
    /// Maximum invocations per workgroup.
    pub max_workgroup_invocations: u32,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({}, {})", self.name, self.vendor, self.class, self.device_type)
    }
}

/// Read-only descriptor of one platform and the devices it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformInfo {
    /// Platform (backend) name, e.g. "Vulkan".
    pub name: String,
    /// Devices in discovery order.
    pub devices: Vec<DeviceInfo>,
}

/// Map a PCI vendor id to a vendor name.
pub fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x10DE => "NVIDIA",
        0x1002 | 0x1022 => "AMD",
        0x8086 => "Intel",
        0x106B => "Apple",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x1010 => "Imagination",
        0x14E4 => "Broadcom",
        0x1414 => "Microsoft",
        0x10005 => "Mesa",
        0x1AE0 => "Google",
        _ => "Unknown",
    }
}

/// Structured capability query: vendor tag plus device class.
///
/// The vendor tag is matched case-insensitively as a substring of the
/// platform name, vendor name or device name. An empty tag matches every
/// device of the class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceQuery {
    /// Vendor substring (stored lowercase).
    pub vendor: String,
    /// Required device class.
    pub class: DeviceClass,
}

impl DeviceQuery {
    /// Create a query; the vendor tag is normalized to lowercase.
    pub fn new(vendor: impl AsRef<str>, class: DeviceClass) -> Self {
        Self {
            vendor: vendor.as_ref().trim().to_lowercase(),
            class,
        }
    }

    /// Query matching any device of the class.
    pub fn any(class: DeviceClass) -> Self {
        Self::new("", class)
    }

    /// Synthetic registry key for contexts built from this query.
    pub fn key(&self) -> String {
        if self.vendor.is_empty() {
            format!("{}:*", self.class)
        } else {
            format!("{}:{}", self.class, self.vendor)
        }
    }

    /// Whether `device` on `platform` satisfies this query.
    pub fn matches(&self, platform: &PlatformInfo, device: &DeviceInfo) -> bool {
        device.class == self.class
            && self.class != DeviceClass::Other
            && (vendor_matches(&self.vendor, &platform.name)
                || vendor_matches(&self.vendor, &device.vendor)
                || vendor_matches(&self.vendor, &device.name))
    }
}

impl fmt::Display for DeviceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Case-insensitive substring match; `needle` must already be lowercase.
pub(crate) fn vendor_matches(needle: &str, haystack: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Snapshot of every platform and device found at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    /// Platforms in discovery order.
    pub platforms: Vec<PlatformInfo>,
}

impl Discovery {
    /// Wrap a list of platforms.
    pub fn new(platforms: Vec<PlatformInfo>) -> Self {
        Self { platforms }
    }

    /// True when no platform exposes any device.
    pub fn is_empty(&self) -> bool {
        self.platforms.iter().all(|p| p.devices.is_empty())
    }

    /// Iterate over all devices with their platform.
    pub fn devices(&self) -> impl Iterator<Item = (&PlatformInfo, &DeviceInfo)> {
        self.platforms
            .iter()
            .flat_map(|p| p.devices.iter().map(move |d| (p, d)))
    }

    /// Find a device by id.
    pub fn device(&self, id: DeviceId) -> Option<&DeviceInfo> {
        self.devices().map(|(_, d)| d).find(|d| d.id == id)
    }

    /// Matching devices of the first platform that has at least one match.
    ///
    /// Returns the platform name and the devices in discovery order, or
    /// `None` when no platform matches.
    pub fn select(&self, query: &DeviceQuery) -> Option<(&PlatformInfo, Vec<&DeviceInfo>)> {
        self.platforms.iter().find_map(|platform| {
            let devices: Vec<&DeviceInfo> = platform
                .devices
                .iter()
                .filter(|d| query.matches(platform, d))
                .collect();
            (!devices.is_empty()).then_some((platform, devices))
        })
    }

    /// Multi-line human-readable listing.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "No compute platforms found\n".to_string();
        }

        let mut desc = String::new();
        for platform in &self.platforms {
            desc.push_str(&format!("Platform: {} ({} device(s))\n", platform.name, platform.devices.len()));
            for d in &platform.devices {
                desc.push_str(&format!(
                    "  {} {}\n      vendor: {} (0x{:04X})  class: {}  type: {}\n      driver: {}\n      max image: {}  max buffer: {} MB  max invocations: {}\n",
                    d.id,
                    d.name,
                    d.vendor,
                    d.vendor_id,
                    d.class,
                    d.device_type,
                    if d.driver.is_empty() { "-" } else { &d.driver },
                    d.max_image_dimension,
                    d.max_buffer_size / (1024 * 1024),
                    d.max_workgroup_invocations,
                ));
            }
        }
        desc
    }
}
