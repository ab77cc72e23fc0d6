//! Pipeline orchestration.
//!
//! ```text
//! select context/queue -> compile program -> kernels x2 -> sampler
//!   -> load source, target
//!   -> rgb_to_lab(source), rgb_to_lab(target)      (one kernel, rebound)
//!   -> blocking read x2 -> host statistics
//!   -> color_transfer(source LAB, stats)           -> blocking read
//! ```
//!
//! Both conversions reuse one kernel object, so they must stay sequential on
//! one queue: the second `set_arg` overwrites the first binding.

use std::path::Path;
use std::sync::Arc;

use colorxfer_compute::{
    CommandQueue, ComputeContext, ComputeError, DeviceClass, DeviceInfo, DeviceProvider, DeviceQuery, ImageFormat,
    Kernel, MemAccess, MemoryObject, ResourceManager, Sampler, SamplerSpec, WgpuDevice,
};
use colorxfer_io::ImageData;
use tracing::{debug, info, trace, warn};

use crate::config::{SelectionPlan, TransferConfig};
use crate::error::{tried_list, TransferError, TransferResult};
use crate::stats::TransferStats;

/// Registry name of the compiled device program.
pub const PROGRAM_NAME: &str = "colortransfer_program";
/// Entry point converting sRGB to LAB.
pub const TO_LAB_ENTRY: &str = "rgb_to_lab";
/// Entry point applying the statistical transfer.
pub const TRANSFER_ENTRY: &str = "color_transfer";

const SAMPLER_NAME: &str = "sampler_clamp_nearest";

// ============================================================================
// Selection
// ============================================================================

/// Pick a context, then a queue on that same context, walking the plan's vendor
/// lists in order. Only exhausting a list is an error.
pub fn select_resources<P: DeviceProvider>(
    rm: &mut ResourceManager<P>,
    class: DeviceClass,
    plan: &SelectionPlan,
) -> TransferResult<(Arc<ComputeContext<P::Device>>, Arc<CommandQueue<P::Device>>)> {
    let candidates = plan.context_candidates();
    let mut context = None;
    for vendor in &candidates {
        let query = DeviceQuery::new(vendor, class);
        match rm.get_context(&query) {
            Some(ctx) => {
                info!(%query, context = ctx.name(), platform = ctx.platform(), "Selected compute context");
                context = Some(ctx);
                break;
            }
            None => warn!(%query, "No matching device, trying next vendor"),
        }
    }
    let context = context.ok_or_else(|| TransferError::NoContext {
        class,
        tried: tried_list(&candidates),
    })?;

    let candidates = plan.queue_candidates();
    for vendor in &candidates {
        match rm.get_command_queue_on(&context, vendor) {
            Some(queue) => {
                info!(queue = %queue.name, device = %queue.device, "Selected command queue");
                return Ok((context, queue));
            }
            None => warn!(vendor = %vendor, context = context.name(), "No queue for vendor, trying next"),
        }
    }
    Err(TransferError::NoQueue {
        context: context.name().to_string(),
        tried: tried_list(&candidates),
    })
}

// ============================================================================
// Results
// ============================================================================

/// Interleaved 4-channel float image (L, a, b, alpha).
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl LabImage {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// LAB triplet at `(x, y)`.
    pub fn lab(&self, x: u32, y: u32) -> [f32; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct TransferOutput {
    pub source_lab: LabImage,
    pub target_lab: LabImage,
    /// Source remapped to the target's statistics, still in LAB.
    pub transferred: LabImage,
    pub stats: TransferStats,
}

enum Input<'a> {
    File(&'a Path),
    Image(&'a ImageData),
}

/// Resources registered by one run, released when it ends.
#[derive(Default)]
struct RunScope {
    memory: Vec<String>,
    samplers: Vec<String>,
}

// ============================================================================
// Session
// ============================================================================

/// Selected device, compiled program, kernels and sampler, ready to run.
pub struct ColorTransfer<'rm, P: DeviceProvider<Device = WgpuDevice>> {
    rm: &'rm mut ResourceManager<P>,
    config: TransferConfig,
    context: Arc<ComputeContext<WgpuDevice>>,
    queue: Arc<CommandQueue<WgpuDevice>>,
    to_lab: Arc<Kernel>,
    transfer: Arc<Kernel>,
    sampler: Arc<Sampler>,
    runs: u32,
}

impl<'rm, P: DeviceProvider<Device = WgpuDevice>> ColorTransfer<'rm, P> {
    /// Select resources and build the program, kernels and sampler.
    ///
    /// Resources already registered on the selected device are reused.
    pub fn new(rm: &'rm mut ResourceManager<P>, config: TransferConfig) -> TransferResult<Self> {
        if let Some((w, h)) = config.working_resolution {
            if w == 0 || h == 0 {
                return Err(TransferError::InvalidResolution(w, h));
            }
        }

        let (context, queue) = select_resources(rm, config.preference, &config.plan)?;
        let dev = queue.device.id;

        let program = match rm.program(PROGRAM_NAME).filter(|p| p.device == dev) {
            Some(p) => p,
            None => {
                info!(path = %config.program_path.display(), "Compiling device program");
                rm.create_program(&context, dev, &config.program_path, PROGRAM_NAME)?
            }
        };
        let to_lab = match rm.kernel(TO_LAB_ENTRY).filter(|k| k.device == dev) {
            Some(k) => k,
            None => rm.create_kernel(&program, TO_LAB_ENTRY)?,
        };
        let transfer = match rm.kernel(TRANSFER_ENTRY).filter(|k| k.device == dev) {
            Some(k) => k,
            None => rm.create_kernel(&program, TRANSFER_ENTRY)?,
        };
        let sampler = match rm.sampler(SAMPLER_NAME).filter(|s| s.device == dev) {
            Some(s) => s,
            None => rm.create_sampler(&context, dev, SamplerSpec::clamp_nearest(), SAMPLER_NAME)?,
        };

        info!(
            deviation_center = ?config.deviation_center,
            working_resolution = ?config.working_resolution,
            "Color transfer ready"
        );

        Ok(Self {
            rm,
            config,
            context,
            queue,
            to_lab,
            transfer,
            sampler,
            runs: 0,
        })
    }

    /// Device the session dispatches to.
    pub fn device(&self) -> &DeviceInfo {
        &self.queue.device
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Transfer the statistics of the `target` file onto the `source` file.
    pub fn run_files(&mut self, source: &Path, target: &Path) -> TransferResult<TransferOutput> {
        self.run(Input::File(source), Input::File(target))
    }

    /// Transfer between decoded images.
    pub fn run_images(&mut self, source: &ImageData, target: &ImageData) -> TransferResult<TransferOutput> {
        self.run(Input::Image(source), Input::Image(target))
    }

    fn run(&mut self, source: Input<'_>, target: Input<'_>) -> TransferResult<TransferOutput> {
        self.runs += 1;
        let prefix = format!("run{}", self.runs);
        let mut scope = RunScope::default();

        let result = self.execute(&prefix, source, target, &mut scope);

        self.to_lab.clear_args();
        self.transfer.clear_args();
        for name in &scope.memory {
            self.rm.release_memory(name);
        }
        for name in &scope.samplers {
            self.rm.release_sampler(name);
        }
        trace!(run = %prefix, released = scope.memory.len() + scope.samplers.len(), "Run resources released");
        result
    }

    fn execute(
        &mut self,
        prefix: &str,
        source: Input<'_>,
        target: Input<'_>,
        scope: &mut RunScope,
    ) -> TransferResult<TransferOutput> {
        let src = self.load(source, format!("{prefix}:source"), scope)?;
        let tgt = self.load(target, format!("{prefix}:target"), scope)?;

        let src_dims = self.config.working_resolution.unwrap_or(image_dims(&src)?);
        let tgt_dims = self.config.working_resolution.unwrap_or(image_dims(&tgt)?);

        let src_lab = self.blank(format!("{prefix}:source_lab"), src_dims, scope)?;
        let tgt_lab = self.blank(format!("{prefix}:target_lab"), tgt_dims, scope)?;
        let output = self.blank(format!("{prefix}:output"), src_dims, scope)?;

        info!(source = ?src_dims, target = ?tgt_dims, "Converting to LAB");
        self.convert(&src, &src_lab, src_dims)?;
        self.convert(&tgt, &tgt_lab, tgt_dims)?;

        let source_lab = self.queue.read_image_f32(&src_lab)?;
        let target_lab = self.queue.read_image_f32(&tgt_lab)?;

        let stats = TransferStats::compute(&source_lab, &target_lab, self.config.deviation_center);
        debug!(
            source_mean = ?stats.source.mean,
            source_std = ?stats.source.std_dev,
            target_mean = ?stats.target.mean,
            target_std = ?stats.target.std_dev,
            "LAB statistics"
        );

        let dev = self.queue.device.id;
        let stats_name = format!("{prefix}:stats");
        let stats_buf =
            self.rm
                .create_buffer_from_host(&self.context, dev, &stats.packed(), MemAccess::ReadOnly, &stats_name)?;
        scope.memory.push(stats_name);

        let sampler_name = format!("{prefix}:transfer_sampler");
        let sampler = self
            .rm
            .create_sampler(&self.context, dev, self.sampler.spec, &sampler_name)?;
        scope.samplers.push(sampler_name);

        info!("Applying statistical transfer");
        self.transfer.set_arg(0, src_lab.clone())?;
        self.transfer.set_arg(1, output.clone())?;
        self.transfer.set_arg(2, sampler)?;
        self.transfer.set_arg(3, stats_buf)?;
        self.queue.enqueue_kernel(&self.transfer, [src_dims.0, src_dims.1], local_size(&self.transfer))?;
        let transferred = self.queue.read_image_f32(&output)?;

        Ok(TransferOutput {
            source_lab: LabImage {
                width: src_dims.0,
                height: src_dims.1,
                data: source_lab,
            },
            target_lab: LabImage {
                width: tgt_dims.0,
                height: tgt_dims.1,
                data: target_lab,
            },
            transferred: LabImage {
                width: src_dims.0,
                height: src_dims.1,
                data: transferred,
            },
            stats,
        })
    }

    fn convert(&self, input: &Arc<MemoryObject>, output: &Arc<MemoryObject>, dims: (u32, u32)) -> TransferResult<()> {
        self.to_lab.set_arg(0, input.clone())?;
        self.to_lab.set_arg(1, output.clone())?;
        self.to_lab.set_arg(2, self.sampler.clone())?;
        self.queue.enqueue_kernel(&self.to_lab, [dims.0, dims.1], local_size(&self.to_lab))?;
        Ok(())
    }

    fn load(&mut self, input: Input<'_>, name: String, scope: &mut RunScope) -> TransferResult<Arc<MemoryObject>> {
        let dev = self.queue.device.id;
        let mem = match input {
            Input::File(path) => {
                info!(path = %path.display(), "Loading image");
                self.rm
                    .create_image_from_file(&self.context, dev, path, MemAccess::ReadOnly, &name)?
            }
            Input::Image(image) => self.rm.create_image_from_rgba8(
                &self.context,
                dev,
                image.width,
                image.height,
                &image.to_rgba8(),
                MemAccess::ReadOnly,
                &name,
            )?,
        };
        scope.memory.push(name);
        Ok(mem)
    }

    fn blank(&mut self, name: String, dims: (u32, u32), scope: &mut RunScope) -> TransferResult<Arc<MemoryObject>> {
        let mem = self.rm.create_blank_image(
            &self.context,
            self.queue.device.id,
            ImageFormat::RGBA32F,
            dims.0,
            dims.1,
            MemAccess::ReadWrite,
            &name,
        )?;
        scope.memory.push(name);
        Ok(mem)
    }
}

/// The program's kernels declare their own workgroup size; dispatch with it.
fn local_size(kernel: &Kernel) -> [u32; 2] {
    [kernel.workgroup_size[0], kernel.workgroup_size[1]]
}

fn image_dims(mem: &MemoryObject) -> TransferResult<(u32, u32)> {
    mem.dimensions()
        .ok_or_else(|| ComputeError::OperationFailed(format!("'{}' is not an image", mem.name)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colorxfer_compute::{DeviceId, MockProvider};

    fn provider() -> MockProvider {
        MockProvider::new()
            .platform("Vulkan", &[("AMD Radeon RX 6800", 0x1002, DeviceClass::Gpu)])
            .platform(
                "Gl",
                &[
                    ("NVIDIA GeForce RTX 2070", 0x10DE, DeviceClass::Gpu),
                    ("llvmpipe (LLVM 16.0.6, 256 bits)", 0x10005, DeviceClass::Cpu),
                ],
            )
    }

    #[test]
    fn gpu_plan_prefers_nvidia() {
        let mut rm = ResourceManager::new(provider());
        rm.discover();
        let (ctx, queue) = select_resources(&mut rm, DeviceClass::Gpu, &SelectionPlan::for_class(DeviceClass::Gpu)).unwrap();
        assert_eq!(ctx.name(), "gpu:nvidia");
        assert_eq!(ctx.platform(), "Gl");
        assert_eq!(queue.device.id, DeviceId(1));
    }

    #[test]
    fn cpu_plan_falls_through_to_llvmpipe() {
        let mut rm = ResourceManager::new(provider());
        rm.discover();
        let (ctx, queue) = select_resources(&mut rm, DeviceClass::Cpu, &SelectionPlan::for_class(DeviceClass::Cpu)).unwrap();
        assert_eq!(ctx.name(), "cpu:llvmpipe");
        assert_eq!(queue.device.id, DeviceId(2));
    }

    #[test]
    fn queue_must_live_on_selected_context() {
        let mut rm = ResourceManager::new(provider());
        rm.discover();
        rm.get_context(&DeviceQuery::new("radeon", DeviceClass::Gpu)).unwrap();

        let plan = SelectionPlan {
            contexts: vec!["nvidia".into()],
            queues: vec!["radeon".into(), "geforce".into()],
            any_fallback: false,
        };
        let (ctx, queue) = select_resources(&mut rm, DeviceClass::Gpu, &plan).unwrap();
        assert_eq!(queue.context, ctx.name());
        assert_eq!(queue.device.name, "NVIDIA GeForce RTX 2070");
    }

    #[test]
    fn same_vendor_on_both_classes() {
        let mut rm = ResourceManager::new(MockProvider::new().platform(
            "Vulkan",
            &[
                ("AMD Ryzen 9 7950X", 0x1002, DeviceClass::Cpu),
                ("AMD Radeon RX 7600", 0x1002, DeviceClass::Gpu),
            ],
        ));
        rm.discover();
        let plan = SelectionPlan::vendors(&["amd"]);

        let (cpu, cpu_queue) = select_resources(&mut rm, DeviceClass::Cpu, &plan).unwrap();
        let (gpu, gpu_queue) = select_resources(&mut rm, DeviceClass::Gpu, &plan).unwrap();
        assert_eq!((cpu.name(), cpu_queue.device.id), ("cpu:amd", DeviceId(0)));
        assert_eq!((gpu.name(), gpu_queue.device.id), ("gpu:amd", DeviceId(1)));
        assert_eq!(gpu_queue.context, "gpu:amd");
    }

    #[test]
    fn exhausted_plan_lists_vendors() {
        let mut rm = ResourceManager::new(provider());
        rm.discover();
        let err = select_resources(&mut rm, DeviceClass::Gpu, &SelectionPlan::vendors(&["apple", "qualcomm"])).unwrap_err();
        match err {
            TransferError::NoContext { class, tried } => {
                assert_eq!(class, DeviceClass::Gpu);
                assert_eq!(tried, "apple, qualcomm");
            }
            other => panic!("unexpected error: {other}"),
        }

        let plan = SelectionPlan {
            contexts: vec!["nvidia".into()],
            queues: vec!["radeon".into()],
            any_fallback: false,
        };
        assert!(matches!(
            select_resources(&mut rm, DeviceClass::Gpu, &plan),
            Err(TransferError::NoQueue { .. })
        ));
    }
}
