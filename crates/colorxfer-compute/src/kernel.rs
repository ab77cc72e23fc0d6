//! Kernels: one compute entry point of a program with ordered argument slots.
//!
//! Argument slots are reflected from the global resources the entry point
//! actually uses, ordered by binding number. A slot keeps whatever was last
//! bound to it; binding again overwrites, it never appends.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::discovery::DeviceId;
use crate::memory::{ImageFormat, MemAccess, MemoryKind, MemoryObject};
use crate::program::Program;
use crate::sampler::{FilterMode, Sampler};
use crate::{ComputeError, ComputeResult};

// ============================================================================
// Argument slots
// ============================================================================

/// What a kernel argument slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `texture_2d<f32>` read through a sampler.
    SampledImage,
    /// `texture_storage_2d<format, access>`.
    StorageImage { format: ImageFormat, access: MemAccess },
    /// Non-comparison `sampler`.
    Sampler,
    /// `var<uniform>`.
    UniformBuffer,
    /// `var<storage, ...>`.
    StorageBuffer { read_only: bool },
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampledImage => f.write_str("sampled image"),
            Self::StorageImage { format, access } => write!(f, "{format} storage image ({access:?})"),
            Self::Sampler => f.write_str("nearest-filter sampler"),
            Self::UniformBuffer => f.write_str("uniform buffer"),
            Self::StorageBuffer { read_only: true } => f.write_str("read-only storage buffer"),
            Self::StorageBuffer { read_only: false } => f.write_str("writable storage buffer"),
        }
    }
}

/// One reflected argument slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSlot {
    /// Binding number in group 0.
    pub binding: u32,
    /// Variable name in the program, if any.
    pub name: Option<String>,
    pub kind: ArgKind,
}

impl ArgSlot {
    fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = match self.kind {
            ArgKind::SampledImage => wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
            },
            ArgKind::StorageImage { format, access } => wgpu::BindingType::StorageTexture {
                access: match access {
                    MemAccess::ReadOnly => wgpu::StorageTextureAccess::ReadOnly,
                    MemAccess::WriteOnly => wgpu::StorageTextureAccess::WriteOnly,
                    MemAccess::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
                },
                format: format.to_wgpu(),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            ArgKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            ArgKind::UniformBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            ArgKind::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

/// Reflect the argument slots of entry point `entry_index`.
pub(crate) fn reflect_slots(
    kernel: &str,
    module: &naga::Module,
    info: &naga::valid::ModuleInfo,
    entry_index: usize,
) -> ComputeResult<Vec<ArgSlot>> {
    let usage = info.get_entry_point(entry_index);
    let unsupported = |binding: u32, reason: String| ComputeError::UnsupportedArgument {
        kernel: kernel.to_string(),
        binding,
        reason,
    };

    let mut slots = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        if usage[handle].is_empty() {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        if binding.group != 0 {
            return Err(unsupported(binding.binding, format!("bind group {} (only group 0 is supported)", binding.group)));
        }

        let kind = match (&module.types[var.ty].inner, var.space) {
            (naga::TypeInner::Image { dim, arrayed, class }, _) => {
                if *dim != naga::ImageDimension::D2 || *arrayed {
                    return Err(unsupported(binding.binding, "only non-arrayed 2D images".into()));
                }
                match class {
                    naga::ImageClass::Sampled { kind: naga::ScalarKind::Float, multi: false } => ArgKind::SampledImage,
                    naga::ImageClass::Storage { format, access } => {
                        let format = ImageFormat::from_storage(*format)
                            .ok_or_else(|| unsupported(binding.binding, format!("storage format {format:?}")))?;
                        let access = match (
                            access.contains(naga::StorageAccess::LOAD),
                            access.contains(naga::StorageAccess::STORE),
                        ) {
                            (true, true) => MemAccess::ReadWrite,
                            (false, true) => MemAccess::WriteOnly,
                            _ => MemAccess::ReadOnly,
                        };
                        ArgKind::StorageImage { format, access }
                    }
                    other => return Err(unsupported(binding.binding, format!("image class {other:?}"))),
                }
            }
            (naga::TypeInner::Sampler { comparison: false }, _) => ArgKind::Sampler,
            (_, naga::AddressSpace::Uniform) => ArgKind::UniformBuffer,
            (_, naga::AddressSpace::Storage { access }) => ArgKind::StorageBuffer {
                read_only: !access.contains(naga::StorageAccess::STORE),
            },
            (inner, space) => {
                return Err(unsupported(binding.binding, format!("{inner:?} in {space:?}")));
            }
        };

        slots.push(ArgSlot {
            binding: binding.binding,
            name: var.name.clone(),
            kind,
        });
    }

    slots.sort_by_key(|s| s.binding);
    Ok(slots)
}

// ============================================================================
// Bound values
// ============================================================================

/// Value bound to an argument slot.
#[derive(Debug, Clone)]
pub enum KernelArg {
    Memory(Arc<MemoryObject>),
    Sampler(Arc<Sampler>),
}

impl KernelArg {
    pub(crate) fn device(&self) -> DeviceId {
        match self {
            Self::Memory(m) => m.device,
            Self::Sampler(s) => s.device,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Memory(m) => m.describe(),
            Self::Sampler(s) => format!("{:?} sampler '{}'", s.spec.filter, s.name),
        }
    }

    /// Whether this value can be bound to a slot of `kind`.
    fn fits(&self, kind: ArgKind) -> bool {
        match (self, kind) {
            (Self::Memory(m), ArgKind::SampledImage) => {
                matches!(m.kind, MemoryKind::Image { .. }) && m.access.readable()
            }
            (Self::Memory(m), ArgKind::StorageImage { format, access }) => match m.kind {
                MemoryKind::Image { format: f, .. } => {
                    f == format
                        && (!access.writable() || m.access.writable())
                        && (!access.readable() || m.access.readable())
                }
                MemoryKind::Buffer { .. } => false,
            },
            (Self::Memory(m), ArgKind::UniformBuffer) => {
                matches!(m.kind, MemoryKind::Buffer { .. }) && m.access.readable()
            }
            (Self::Memory(m), ArgKind::StorageBuffer { read_only }) => {
                matches!(m.kind, MemoryKind::Buffer { .. }) && (read_only || m.access.writable())
            }
            (Self::Sampler(s), ArgKind::Sampler) => s.spec.filter == FilterMode::Nearest,
            _ => false,
        }
    }
}

impl From<Arc<MemoryObject>> for KernelArg {
    fn from(m: Arc<MemoryObject>) -> Self {
        Self::Memory(m)
    }
}

impl From<Arc<Sampler>> for KernelArg {
    fn from(s: Arc<Sampler>) -> Self {
        Self::Sampler(s)
    }
}

// ============================================================================
// Kernel
// ============================================================================

/// Named compute entry point of a program.
pub struct Kernel {
    pub name: String,
    pub program: String,
    pub entry: String,
    pub context: String,
    pub device: DeviceId,
    /// `@workgroup_size` declared by the entry point.
    pub workgroup_size: [u32; 3],
    slots: Vec<ArgSlot>,
    pub(crate) layout: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::ComputePipeline,
    args: Mutex<Vec<Option<KernelArg>>>,
}

impl Kernel {
    /// Reflect `entry` and build its compute pipeline.
    pub(crate) fn build(name: String, program: &Program, entry: &str) -> ComputeResult<Self> {
        let index = program
            .entry_index(entry)
            .ok_or_else(|| ComputeError::KernelNotFound {
                program: program.name.clone(),
                entry: entry.to_string(),
            })?;
        let slots = reflect_slots(&name, &program.module, &program.info, index)?;
        let workgroup_size = program.module.entry_points[index].workgroup_size;

        let entries: Vec<wgpu::BindGroupLayoutEntry> = slots.iter().map(ArgSlot::layout_entry).collect();
        let ((layout, pipeline), err) = program.gpu.scoped(|device| {
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&name),
                entries: &entries,
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&name),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&name),
                layout: Some(&pipeline_layout),
                module: &program.shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });
            (layout, pipeline)
        });
        if let Some(err) = err {
            return Err(ComputeError::KernelCreation {
                name,
                message: err.to_string(),
            });
        }

        Ok(Self {
            args: Mutex::new(vec![None; slots.len()]),
            name,
            program: program.name.clone(),
            entry: entry.to_string(),
            context: program.context.clone(),
            device: program.device,
            workgroup_size,
            slots,
            layout,
            pipeline,
        })
    }

    /// Reflected argument slots, in index order.
    pub fn slots(&self) -> &[ArgSlot] {
        &self.slots
    }

    pub fn arg_count(&self) -> usize {
        self.slots.len()
    }

    /// Bind `arg` to slot `index`, replacing any previous binding.
    pub fn set_arg(&self, index: usize, arg: impl Into<KernelArg>) -> ComputeResult<()> {
        let arg = arg.into();
        let slot = self.slots.get(index).ok_or_else(|| ComputeError::ArgumentIndex {
            kernel: self.name.clone(),
            index,
            count: self.slots.len(),
        })?;
        if !arg.fits(slot.kind) {
            return Err(ComputeError::ArgumentMismatch {
                kernel: self.name.clone(),
                index,
                expected: slot.kind.to_string(),
                actual: arg.describe(),
            });
        }
        trace!(kernel = %self.name, index, binding = slot.binding, "set_arg");
        self.lock_args()[index] = Some(arg);
        Ok(())
    }

    /// Unbind every slot, dropping the held resource handles.
    pub fn clear_args(&self) {
        self.lock_args().iter_mut().for_each(|a| *a = None);
    }

    /// Snapshot of the bound values; fails on the first unbound slot.
    pub(crate) fn bound_args(&self) -> ComputeResult<Vec<KernelArg>> {
        self.lock_args()
            .iter()
            .enumerate()
            .map(|(index, a)| {
                a.clone().ok_or_else(|| ComputeError::UnboundArgument {
                    kernel: self.name.clone(),
                    index,
                })
            })
            .collect()
    }

    fn lock_args(&self) -> MutexGuard<'_, Vec<Option<KernelArg>>> {
        self.args.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("entry", &self.entry)
            .field("device", &self.device)
            .field("workgroup_size", &self.workgroup_size)
            .field("slots", &self.slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::validate;

    const SRC: &str = r#"
@group(0) @binding(3) var<storage, read> stats: array<f32, 12>;
@group(0) @binding(0) var src_image: texture_2d<f32>;
@group(0) @binding(2) var image_sampler: sampler;
@group(0) @binding(1) var dst_image: texture_storage_2d<rgba32float, write>;
@group(0) @binding(4) var<uniform> tint: vec4<f32>;

@compute @workgroup_size(1, 1, 1)
fn copy(@builtin(global_invocation_id) gid: vec3<u32>) {
    let uv = vec2<f32>(gid.xy) / vec2<f32>(textureDimensions(dst_image));
    let c = textureSampleLevel(src_image, image_sampler, uv, 0.0);
    textureStore(dst_image, vec2<i32>(gid.xy), c * stats[0]);
}

@compute @workgroup_size(8, 8, 1)
fn other(@builtin(global_invocation_id) gid: vec3<u32>) {
    textureStore(dst_image, vec2<i32>(gid.xy), tint);
}
"#;

    #[test]
    fn slots_follow_binding_order_and_usage() {
        let v = validate("t", SRC).unwrap();
        let slots = reflect_slots("copy", &v.module, &v.info, 0).unwrap();
        let bindings: Vec<u32> = slots.iter().map(|s| s.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert_eq!(slots[0].kind, ArgKind::SampledImage);
        assert_eq!(
            slots[1].kind,
            ArgKind::StorageImage {
                format: ImageFormat::RGBA32F,
                access: MemAccess::WriteOnly
            }
        );
        assert_eq!(slots[2].kind, ArgKind::Sampler);
        assert_eq!(slots[3].kind, ArgKind::StorageBuffer { read_only: true });
        assert_eq!(slots[3].name.as_deref(), Some("stats"));
    }

    #[test]
    fn unused_globals_are_skipped() {
        let v = validate("t", SRC).unwrap();
        let slots = reflect_slots("other", &v.module, &v.info, 1).unwrap();
        let bindings: Vec<u32> = slots.iter().map(|s| s.binding).collect();
        assert_eq!(bindings, vec![1, 4]);
        assert_eq!(slots[1].kind, ArgKind::UniformBuffer);
        assert_eq!(v.module.entry_points[1].workgroup_size, [8, 8, 1]);
    }

    #[test]
    fn other_groups_rejected() {
        let src = r#"
@group(1) @binding(0) var<storage, read_write> data: array<f32>;
@compute @workgroup_size(1) fn main(@builtin(global_invocation_id) gid: vec3<u32>) { data[gid.x] = 1.0; }
"#;
        let v = validate("t", src).unwrap();
        assert!(matches!(
            reflect_slots("main", &v.module, &v.info, 0),
            Err(ComputeError::UnsupportedArgument { binding: 0, .. })
        ));
    }
}
