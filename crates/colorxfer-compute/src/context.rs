//! Compute contexts and command queues.

use crate::discovery::{DeviceId, DeviceInfo, DeviceQuery};

/// One opened device inside a context.
#[derive(Debug, Clone)]
pub struct ContextDevice<D> {
    pub info: DeviceInfo,
    pub handle: D,
}

/// Owning scope for the devices matched by one query on one platform.
#[derive(Debug)]
pub struct ComputeContext<D> {
    name: String,
    query: DeviceQuery,
    platform: String,
    devices: Vec<ContextDevice<D>>,
}

impl<D> ComputeContext<D> {
    pub(crate) fn new(name: String, query: DeviceQuery, platform: String, devices: Vec<ContextDevice<D>>) -> Self {
        Self {
            name,
            query,
            platform,
            devices,
        }
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query the context was built from.
    pub fn query(&self) -> &DeviceQuery {
        &self.query
    }

    /// Platform all devices belong to.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Devices in discovery order; never empty.
    pub fn devices(&self) -> &[ContextDevice<D>] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&ContextDevice<D>> {
        self.devices.iter().find(|d| d.info.id == id)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.info.id).collect()
    }
}

/// Ordered submission channel bound to one context device.
///
/// Work submitted to the same queue executes in submission order.
#[derive(Debug)]
pub struct CommandQueue<D> {
    pub name: String,
    pub context: String,
    pub device: DeviceInfo,
    pub(crate) handle: D,
}

impl<D> CommandQueue<D> {
    pub(crate) fn new(name: String, context: String, device: DeviceInfo, handle: D) -> Self {
        Self {
            name,
            context,
            device,
            handle,
        }
    }

    /// Device handle the queue submits to.
    pub fn handle(&self) -> &D {
        &self.handle
    }
}
