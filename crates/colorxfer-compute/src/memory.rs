//! Device memory objects: images and buffers.

use crate::discovery::DeviceId;

/// Element type of an image channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 8-bit unsigned, normalized to 0..1 when sampled.
    UnormInt8,
    /// 32-bit float.
    Float32,
}

/// Pixel format of an image memory object. Always four channels (RGBA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub element: ElementType,
}

impl ImageFormat {
    pub const RGBA8: Self = Self {
        element: ElementType::UnormInt8,
    };
    pub const RGBA32F: Self = Self {
        element: ElementType::Float32,
    };

    pub fn bytes_per_pixel(&self) -> u32 {
        match self.element {
            ElementType::UnormInt8 => 4,
            ElementType::Float32 => 16,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self.element {
            ElementType::UnormInt8 => wgpu::TextureFormat::Rgba8Unorm,
            ElementType::Float32 => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Format matching a WGSL storage texture format, if supported.
    pub fn from_storage(format: naga::StorageFormat) -> Option<Self> {
        match format {
            naga::StorageFormat::Rgba8Unorm => Some(Self::RGBA8),
            naga::StorageFormat::Rgba32Float => Some(Self::RGBA32F),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.element {
            ElementType::UnormInt8 => f.write_str("rgba8unorm"),
            ElementType::Float32 => f.write_str("rgba32float"),
        }
    }
}

/// Kernel-side access permitted on a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl MemAccess {
    pub fn readable(self) -> bool {
        self != Self::WriteOnly
    }

    pub fn writable(self) -> bool {
        self != Self::ReadOnly
    }
}

/// Image or buffer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Image {
        width: u32,
        height: u32,
        format: ImageFormat,
    },
    Buffer {
        /// Size in bytes.
        size: u64,
    },
}

#[derive(Debug)]
pub(crate) enum RawMemory {
    Image(wgpu::Texture),
    Buffer(wgpu::Buffer),
}

/// Device-resident allocation owned by one context.
#[derive(Debug)]
pub struct MemoryObject {
    pub name: String,
    pub context: String,
    pub device: DeviceId,
    pub kind: MemoryKind,
    pub access: MemAccess,
    pub(crate) raw: RawMemory,
}

impl MemoryObject {
    pub(crate) fn new(
        name: String,
        context: String,
        device: DeviceId,
        kind: MemoryKind,
        access: MemAccess,
        raw: RawMemory,
    ) -> Self {
        Self {
            name,
            context,
            device,
            kind,
            access,
            raw,
        }
    }

    /// Image dimensions, `None` for buffers.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.kind {
            MemoryKind::Image { width, height, .. } => Some((width, height)),
            MemoryKind::Buffer { .. } => None,
        }
    }

    pub fn image_format(&self) -> Option<ImageFormat> {
        match self.kind {
            MemoryKind::Image { format, .. } => Some(format),
            MemoryKind::Buffer { .. } => None,
        }
    }

    /// Allocation size in bytes.
    pub fn byte_size(&self) -> u64 {
        match self.kind {
            MemoryKind::Image { width, height, format } => {
                width as u64 * height as u64 * format.bytes_per_pixel() as u64
            }
            MemoryKind::Buffer { size } => size,
        }
    }

    /// Short description for binding errors.
    pub(crate) fn describe(&self) -> String {
        match self.kind {
            MemoryKind::Image { width, height, format } => {
                format!("{format} image '{}' {width}x{height} ({:?})", self.name, self.access)
            }
            MemoryKind::Buffer { size } => format!("buffer '{}' {size} bytes ({:?})", self.name, self.access),
        }
    }

    pub(crate) fn texture(&self) -> Option<&wgpu::Texture> {
        match &self.raw {
            RawMemory::Image(t) => Some(t),
            RawMemory::Buffer(_) => None,
        }
    }

    pub(crate) fn buffer(&self) -> Option<&wgpu::Buffer> {
        match &self.raw {
            RawMemory::Buffer(b) => Some(b),
            RawMemory::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_sizes() {
        assert_eq!(ImageFormat::RGBA8.bytes_per_pixel(), 4);
        assert_eq!(ImageFormat::RGBA32F.bytes_per_pixel(), 16);
        assert_eq!(ImageFormat::RGBA32F.to_wgpu(), wgpu::TextureFormat::Rgba32Float);
    }

    #[test]
    fn storage_format_mapping() {
        assert_eq!(ImageFormat::from_storage(naga::StorageFormat::Rgba32Float), Some(ImageFormat::RGBA32F));
        assert_eq!(ImageFormat::from_storage(naga::StorageFormat::R32Float), None);
    }

    #[test]
    fn access_flags() {
        assert!(MemAccess::ReadOnly.readable());
        assert!(!MemAccess::ReadOnly.writable());
        assert!(!MemAccess::WriteOnly.readable());
        assert!(MemAccess::ReadWrite.readable() && MemAccess::ReadWrite.writable());
    }
}
