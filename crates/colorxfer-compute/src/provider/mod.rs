//! Resource providers: where platforms come from and how devices are opened.
//!
//! ```text
//! ResourceManager<P: DeviceProvider>
//!     +-- WgpuProvider  (real adapters via wgpu)
//!     +-- MockProvider  (fabricated descriptors, no hardware)
//! ```
//!
//! Context and queue selection only needs descriptors, so it runs against
//! either provider. Programs, kernels and memory objects need real devices
//! and are only available when `P::Device` is [`WgpuDevice`].

mod mock;
mod wgpu_provider;

pub use mock::{MockDevice, MockProvider};
pub use wgpu_provider::{WgpuDevice, WgpuProvider};

use crate::discovery::{DeviceInfo, PlatformInfo};
use crate::ComputeResult;

/// Source of compute platforms and opener of devices.
pub trait DeviceProvider {
    /// Handle to an opened device; cloned into contexts and queues.
    type Device: Clone;

    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Enumerate platforms and their devices.
    fn enumerate(&mut self) -> Vec<PlatformInfo>;

    /// Open a previously enumerated device.
    fn open(&self, device: &DeviceInfo) -> ComputeResult<Self::Device>;
}
