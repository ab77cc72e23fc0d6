//! The resource manager: discovery, selection and named resource factories.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use wgpu::util::DeviceExt;

use crate::context::{CommandQueue, ComputeContext, ContextDevice};
use crate::discovery::{vendor_matches, DeviceId, DeviceQuery, Discovery};
use crate::kernel::Kernel;
use crate::memory::{ImageFormat, MemAccess, MemoryKind, MemoryObject, RawMemory};
use crate::program::Program;
use crate::provider::{DeviceProvider, WgpuDevice};
use crate::registry::Registry;
use crate::sampler::{Sampler, SamplerSpec};
use crate::{ComputeError, ComputeResult};

/// Owner of every compute resource created during a run.
///
/// Resources are registered by name so later stages can look them up
/// instead of recreating them. [`shutdown`](Self::shutdown) (also run on
/// drop) releases everything in dependency order.
pub struct ResourceManager<P: DeviceProvider> {
    provider: P,
    discovery: Discovery,
    contexts: Registry<ComputeContext<P::Device>>,
    queues: Registry<CommandQueue<P::Device>>,
    programs: Registry<Program>,
    kernels: Registry<Kernel>,
    samplers: Registry<Sampler>,
    memory: Registry<MemoryObject>,
}

impl<P: DeviceProvider> ResourceManager<P> {
    /// Manager over `provider`. Call [`discover`](Self::discover) before selecting.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            discovery: Discovery::default(),
            contexts: Registry::new("context"),
            queues: Registry::new("queue"),
            programs: Registry::new("program"),
            kernels: Registry::new("kernel"),
            samplers: Registry::new("sampler"),
            memory: Registry::new("memory object"),
        }
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Enumerate platforms and devices. Finding none is logged, not fatal.
    pub fn discover(&mut self) -> &Discovery {
        trace!(provider = self.provider.name(), "discover");
        self.discovery = Discovery::new(self.provider.enumerate());
        if self.discovery.is_empty() {
            warn!(provider = self.provider.name(), "No compute platforms found");
        } else {
            debug!("Discovered compute resources:\n{}", self.discovery.describe());
        }
        &self.discovery
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    // ========================================================================
    // Contexts and queues
    // ========================================================================

    /// Context for `query`, cached under the query's key.
    ///
    /// Returns `None` when no device matches or none of the matches could be
    /// opened; the caller decides whether to try another vendor.
    pub fn get_context(&mut self, query: &DeviceQuery) -> Option<Arc<ComputeContext<P::Device>>> {
        self.get_context_named(query, &query.key())
    }

    /// Like [`get_context`](Self::get_context) but registered under `name`.
    ///
    /// A context already registered under `name` is returned only if it was
    /// built from an equivalent query; otherwise the result is `None`.
    pub fn get_context_named(&mut self, query: &DeviceQuery, name: &str) -> Option<Arc<ComputeContext<P::Device>>> {
        trace!(%query, name, "get_context");
        if let Some(ctx) = self.contexts.get(name) {
            if ctx.query() == query {
                return Some(ctx);
            }
            warn!(context = name, existing = %ctx.query(), requested = %query, "Context name is taken by another query");
            return None;
        }

        let (platform, matches) = self.discovery.select(query)?;
        let mut devices = Vec::with_capacity(matches.len());
        for info in matches {
            match self.provider.open(info) {
                Ok(handle) => devices.push(ContextDevice {
                    info: info.clone(),
                    handle,
                }),
                Err(e) => warn!(device = %info, "Skipping device: {e}"),
            }
        }
        if devices.is_empty() {
            return None;
        }

        info!(
            context = name,
            platform = %platform.name,
            devices = ?devices.iter().map(|d| d.info.name.as_str()).collect::<Vec<_>>(),
            "Created compute context"
        );
        let ctx = ComputeContext::new(name.to_string(), query.clone(), platform.name.clone(), devices);
        self.contexts.insert(name, ctx).ok()
    }

    /// Queue on the first device, across existing contexts in name order,
    /// whose platform, vendor or name contains `vendor` (case-insensitive).
    pub fn get_command_queue(&mut self, vendor: &str) -> Option<Arc<CommandQueue<P::Device>>> {
        trace!(vendor, "get_command_queue");
        let contexts: Vec<_> = self.contexts.iter().map(|(_, ctx)| Arc::clone(ctx)).collect();
        contexts.iter().find_map(|ctx| self.get_command_queue_on(ctx, vendor))
    }

    /// Queue on the first device of `ctx` matching `vendor`, cached under
    /// `queue:<context>:<vendor>`.
    pub fn get_command_queue_on(
        &mut self,
        ctx: &ComputeContext<P::Device>,
        vendor: &str,
    ) -> Option<Arc<CommandQueue<P::Device>>> {
        let needle = vendor.trim().to_lowercase();
        let name = queue_key(ctx.name(), &needle);
        if let Some(queue) = self.queues.get(&name) {
            return Some(queue);
        }

        let device = ctx.devices().iter().find(|d| {
            vendor_matches(&needle, ctx.platform())
                || vendor_matches(&needle, &d.info.vendor)
                || vendor_matches(&needle, &d.info.name)
        })?;

        info!(queue = %name, context = ctx.name(), device = %device.info, "Created command queue");
        let queue = CommandQueue::new(name.clone(), ctx.name().to_string(), device.info.clone(), device.handle.clone());
        self.queues.insert(&name, queue).ok()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn context(&self, name: &str) -> Option<Arc<ComputeContext<P::Device>>> {
        self.contexts.get(name)
    }

    pub fn queue(&self, name: &str) -> Option<Arc<CommandQueue<P::Device>>> {
        self.queues.get(name)
    }

    pub fn program(&self, name: &str) -> Option<Arc<Program>> {
        self.programs.get(name)
    }

    pub fn kernel(&self, name: &str) -> Option<Arc<Kernel>> {
        self.kernels.get(name)
    }

    pub fn sampler(&self, name: &str) -> Option<Arc<Sampler>> {
        self.samplers.get(name)
    }

    pub fn memory_object(&self, name: &str) -> Option<Arc<MemoryObject>> {
        self.memory.get(name)
    }

    /// Names of the registered contexts.
    pub fn context_names(&self) -> Vec<String> {
        self.contexts.names()
    }

    /// Names of the registered memory objects.
    pub fn memory_names(&self) -> Vec<String> {
        self.memory.names()
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Unregister a memory object. The allocation is freed once the last
    /// handle (kernel argument, caller copy) is dropped.
    pub fn release_memory(&mut self, name: &str) -> bool {
        trace!(name, "release_memory");
        self.memory.remove(name).is_some()
    }

    pub fn release_sampler(&mut self, name: &str) -> bool {
        self.samplers.remove(name).is_some()
    }

    /// Release every resource: memory, samplers, kernels, programs, queues,
    /// contexts. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for (_, kernel) in self.kernels.iter() {
            kernel.clear_args();
        }
        let released = [
            (self.memory.kind(), self.memory.clear()),
            (self.samplers.kind(), self.samplers.clear()),
            (self.kernels.kind(), self.kernels.clear()),
            (self.programs.kind(), self.programs.clear()),
            (self.queues.kind(), self.queues.clear()),
            (self.contexts.kind(), self.contexts.clear()),
        ];
        if released.iter().any(|(_, n)| *n > 0) {
            debug!(?released, "Compute resources released");
        }
    }
}

impl<P: DeviceProvider> Drop for ResourceManager<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Factories (real devices only)
// ============================================================================

impl<P: DeviceProvider<Device = WgpuDevice>> ResourceManager<P> {
    /// Read program source from `path` and compile it for `device`.
    pub fn create_program(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        path: impl AsRef<Path>,
        name: &str,
    ) -> ComputeResult<Arc<Program>> {
        let path = path.as_ref();
        trace!(path = %path.display(), name, "create_program");
        let source = std::fs::read_to_string(path).map_err(|source| ComputeError::ProgramSource {
            path: path.to_path_buf(),
            source,
        })?;
        self.create_program_from_source(ctx, device, source, name)
    }

    /// Compile in-memory program source for `device`.
    pub fn create_program_from_source(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        source: impl Into<String>,
        name: &str,
    ) -> ComputeResult<Arc<Program>> {
        self.ensure_free(&self.programs, name)?;
        let gpu = context_device(ctx, device)?;
        let program = Program::build(name.to_string(), ctx.name().to_string(), device, &gpu.handle, source.into())?;
        self.programs.insert(name, program)
    }

    /// Kernel for `entry`, registered under the entry point name.
    pub fn create_kernel(&mut self, program: &Program, entry: &str) -> ComputeResult<Arc<Kernel>> {
        self.create_kernel_named(program, entry, entry)
    }

    /// Kernel for `entry`, registered under `name`.
    pub fn create_kernel_named(&mut self, program: &Program, entry: &str, name: &str) -> ComputeResult<Arc<Kernel>> {
        trace!(program = %program.name, entry, name, "create_kernel");
        self.ensure_free(&self.kernels, name)?;
        let kernel = Kernel::build(name.to_string(), program, entry)?;
        debug!(kernel = name, slots = kernel.arg_count(), workgroup = ?kernel.workgroup_size, "Kernel created");
        self.kernels.insert(name, kernel)
    }

    pub fn create_sampler(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        spec: SamplerSpec,
        name: &str,
    ) -> ComputeResult<Arc<Sampler>> {
        trace!(?spec, name, "create_sampler");
        self.ensure_free(&self.samplers, name)?;
        let gpu = &context_device(ctx, device)?.handle;
        let raw = gpu.device.create_sampler(&spec.descriptor(name));
        let sampler = Sampler::new(name.to_string(), ctx.name().to_string(), device, spec, raw);
        self.samplers.insert(name, sampler)
    }

    /// Uninitialised image for intermediate results.
    pub fn create_blank_image(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        format: ImageFormat,
        width: u32,
        height: u32,
        access: MemAccess,
        name: &str,
    ) -> ComputeResult<Arc<MemoryObject>> {
        trace!(%format, width, height, name, "create_blank_image");
        self.create_image(ctx, device, format, width, height, access, None, name)
    }

    /// RGBA8 image initialised from host pixels.
    pub fn create_image_from_rgba8(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        width: u32,
        height: u32,
        pixels: &[u8],
        access: MemAccess,
        name: &str,
    ) -> ComputeResult<Arc<MemoryObject>> {
        trace!(width, height, name, "create_image_from_rgba8");
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ComputeError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        self.create_image(ctx, device, ImageFormat::RGBA8, width, height, access, Some(pixels), name)
    }

    /// Decode `path` and upload it as an RGBA8 image.
    #[cfg(feature = "io")]
    pub fn create_image_from_file(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        path: impl AsRef<Path>,
        access: MemAccess,
        name: &str,
    ) -> ComputeResult<Arc<MemoryObject>> {
        let path = path.as_ref();
        trace!(path = %path.display(), name, "create_image_from_file");
        let image = colorxfer_io::read(path).map_err(|source| ComputeError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), width = image.width, height = image.height, channels = image.channels, "Image decoded");
        let pixels = image.to_rgba8();
        self.create_image_from_rgba8(ctx, device, image.width, image.height, &pixels, access, name)
    }

    /// Buffer initialised from host floats.
    pub fn create_buffer_from_host(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        data: &[f32],
        access: MemAccess,
        name: &str,
    ) -> ComputeResult<Arc<MemoryObject>> {
        trace!(len = data.len(), name, "create_buffer_from_host");
        if data.is_empty() {
            return Err(ComputeError::BufferSizeMismatch { expected: 1, actual: 0 });
        }
        self.ensure_free(&self.memory, name)?;
        let gpu = &context_device(ctx, device)?.handle;

        let (buffer, err) = gpu.scoped(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
        });
        if let Some(err) = err {
            return Err(ComputeError::OperationFailed(format!("buffer '{name}': {err}")));
        }

        let kind = MemoryKind::Buffer {
            size: std::mem::size_of_val(data) as u64,
        };
        let mem = MemoryObject::new(
            name.to_string(),
            ctx.name().to_string(),
            device,
            kind,
            access,
            RawMemory::Buffer(buffer),
        );
        self.memory.insert(name, mem)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_image(
        &mut self,
        ctx: &ComputeContext<WgpuDevice>,
        device: DeviceId,
        format: ImageFormat,
        width: u32,
        height: u32,
        access: MemAccess,
        pixels: Option<&[u8]>,
        name: &str,
    ) -> ComputeResult<Arc<MemoryObject>> {
        if width == 0 || height == 0 {
            return Err(ComputeError::InvalidDimensions(width, height));
        }
        self.ensure_free(&self.memory, name)?;
        let gpu = &context_device(ctx, device)?.handle;
        let limit = gpu.limits.max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(ComputeError::ImageTooLarge { width, height, limit });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let (texture, err) = gpu.scoped(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(name),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: format.to_wgpu(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            if let Some(pixels) = pixels {
                gpu.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    pixels,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(width * format.bytes_per_pixel()),
                        rows_per_image: Some(height),
                    },
                    size,
                );
            }
            texture
        });
        if let Some(err) = err {
            return Err(ComputeError::OperationFailed(format!("image '{name}': {err}")));
        }

        let kind = MemoryKind::Image { width, height, format };
        let mem = MemoryObject::new(
            name.to_string(),
            ctx.name().to_string(),
            device,
            kind,
            access,
            RawMemory::Image(texture),
        );
        self.memory.insert(name, mem)
    }

    fn ensure_free<T>(&self, registry: &Registry<T>, name: &str) -> ComputeResult<()> {
        if registry.contains(name) {
            return Err(ComputeError::DuplicateName {
                kind: registry.kind(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Registry key of the queue for `vendor` on context `context`.
pub fn queue_key(context: &str, vendor: &str) -> String {
    format!("queue:{context}:{}", vendor.trim().to_lowercase())
}

fn context_device(ctx: &ComputeContext<WgpuDevice>, device: DeviceId) -> ComputeResult<&ContextDevice<WgpuDevice>> {
    ctx.device(device).ok_or_else(|| ComputeError::ContextMismatch(format!(
        "device {device} is not part of context '{}'",
        ctx.name()
    )))
}
