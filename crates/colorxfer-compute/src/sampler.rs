//! Image samplers.

use crate::discovery::DeviceId;

/// Behaviour for coordinates outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl AddressMode {
    fn to_wgpu(self) -> wgpu::AddressMode {
        match self {
            Self::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Self::Repeat => wgpu::AddressMode::Repeat,
            Self::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

impl FilterMode {
    fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            Self::Nearest => wgpu::FilterMode::Nearest,
            Self::Linear => wgpu::FilterMode::Linear,
        }
    }
}

/// Sampler description.
///
/// `normalized_coords` is recorded for callers; kernels always sample with
/// normalized coordinates derived from the work-item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSpec {
    pub normalized_coords: bool,
    pub address: AddressMode,
    pub filter: FilterMode,
}

impl SamplerSpec {
    pub fn new(normalized_coords: bool, address: AddressMode, filter: FilterMode) -> Self {
        Self {
            normalized_coords,
            address,
            filter,
        }
    }

    /// Clamp-to-edge, nearest, normalized: what the LAB kernels read with.
    pub fn clamp_nearest() -> Self {
        Self::new(true, AddressMode::ClampToEdge, FilterMode::Nearest)
    }

    pub(crate) fn descriptor<'a>(&self, label: &'a str) -> wgpu::SamplerDescriptor<'a> {
        let address = self.address.to_wgpu();
        let filter = self.filter.to_wgpu();
        wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }
}

impl Default for SamplerSpec {
    fn default() -> Self {
        Self::clamp_nearest()
    }
}

/// Immutable sampler object owned by one context device.
#[derive(Debug)]
pub struct Sampler {
    pub name: String,
    pub context: String,
    pub device: DeviceId,
    pub spec: SamplerSpec,
    pub(crate) raw: wgpu::Sampler,
}

impl Sampler {
    pub(crate) fn new(
        name: String,
        context: String,
        device: DeviceId,
        spec: SamplerSpec,
        raw: wgpu::Sampler,
    ) -> Self {
        Self {
            name,
            context,
            device,
            spec,
            raw,
        }
    }

    /// Underlying wgpu sampler.
    pub fn raw(&self) -> &wgpu::Sampler {
        &self.raw
    }
}
