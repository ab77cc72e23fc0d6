//! Kernel dispatch and blocking readback on a wgpu command queue.

use tracing::{debug, trace};

use crate::context::CommandQueue;
use crate::discovery::DeviceId;
use crate::kernel::{Kernel, KernelArg};
use crate::memory::{MemoryKind, MemoryObject};
use crate::provider::WgpuDevice;
use crate::{ComputeError, ComputeResult};

impl CommandQueue<WgpuDevice> {
    /// Submit `kernel` over a `global` work domain split into `local`-sized groups.
    ///
    /// Every check (device ownership, workgroup shape, bound arguments) runs
    /// before anything is encoded. Submission does not wait for completion;
    /// the next blocking read on this queue observes the result.
    pub fn enqueue_kernel(&self, kernel: &Kernel, global: [u32; 2], local: [u32; 2]) -> ComputeResult<()> {
        trace!(queue = %self.name, kernel = %kernel.name, ?global, ?local, "enqueue_kernel");

        self.check_device("kernel", &kernel.name, kernel.device)?;
        if global[0] == 0 || global[1] == 0 {
            return Err(ComputeError::InvalidDimensions(global[0], global[1]));
        }
        let declared = kernel.workgroup_size;
        if local != [declared[0], declared[1]] || declared[2] != 1 {
            return Err(ComputeError::WorkgroupMismatch {
                kernel: kernel.name.clone(),
                declared,
                requested: local,
            });
        }

        let groups = [global[0].div_ceil(local[0]), global[1].div_ceil(local[1])];
        let max_groups = self.handle.limits.max_compute_workgroups_per_dimension;
        if groups[0] > max_groups || groups[1] > max_groups {
            return Err(ComputeError::Dispatch(format!(
                "{}x{} workgroups exceeds device limit {max_groups} per dimension",
                groups[0], groups[1]
            )));
        }

        let args = kernel.bound_args()?;
        for arg in &args {
            let name = match arg {
                KernelArg::Memory(m) => &m.name,
                KernelArg::Sampler(s) => &s.name,
            };
            self.check_device("argument", name, arg.device())?;
        }

        // Views must outlive the bind group descriptor.
        let views: Vec<Option<wgpu::TextureView>> = args
            .iter()
            .map(|arg| match arg {
                KernelArg::Memory(m) => m
                    .texture()
                    .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default())),
                KernelArg::Sampler(_) => None,
            })
            .collect();

        let mut entries = Vec::with_capacity(args.len());
        for ((slot, arg), view) in kernel.slots().iter().zip(&args).zip(&views) {
            let resource = match (arg, view) {
                (KernelArg::Sampler(s), _) => wgpu::BindingResource::Sampler(s.raw()),
                (KernelArg::Memory(_), Some(view)) => wgpu::BindingResource::TextureView(view),
                (KernelArg::Memory(m), None) => match m.buffer() {
                    Some(buffer) => buffer.as_entire_binding(),
                    None => {
                        return Err(ComputeError::OperationFailed(format!(
                            "memory object '{}' has no backing allocation",
                            m.name
                        )));
                    }
                },
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource,
            });
        }

        let ((), err) = self.handle.scoped(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&kernel.name),
                layout: &kernel.layout,
                entries: &entries,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&kernel.name),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&kernel.name),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups[0], groups[1], 1);
            }
            self.handle.queue.submit(std::iter::once(encoder.finish()));
        });
        if let Some(err) = err {
            return Err(ComputeError::Dispatch(format!("{}: {err}", kernel.name)));
        }

        debug!(kernel = %kernel.name, groups = ?groups, "Kernel submitted");
        Ok(())
    }

    /// Block until all submitted work has completed.
    pub fn finish(&self) {
        self.handle.device.poll(wgpu::Maintain::Wait);
    }

    /// Blocking read of an image into tightly packed rows.
    pub fn read_image_bytes(&self, image: &MemoryObject) -> ComputeResult<Vec<u8>> {
        trace!(queue = %self.name, image = %image.name, "read_image");
        self.check_device("image", &image.name, image.device)?;
        let (MemoryKind::Image { width, height, format }, Some(texture)) = (image.kind, image.texture()) else {
            return Err(ComputeError::Readback(format!("'{}' is not an image", image.name)));
        };

        let row_bytes = width * format.bytes_per_pixel();
        let padded_row = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let device = &self.handle.device;

        let (staging, err) = self.handle.scoped(|device| {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("colorxfer::readback"),
                size: padded_row as u64 * height as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("colorxfer::readback"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            self.handle.queue.submit(std::iter::once(encoder.finish()));
            staging
        });
        if let Some(err) = err {
            return Err(ComputeError::Readback(format!("{}: {err}", image.name)));
        }

        let padded = map_blocking(device, &staging)?;
        let row_bytes = row_bytes as usize;
        let mut out = Vec::with_capacity(row_bytes * height as usize);
        for row in padded.chunks_exact(padded_row as usize) {
            out.extend_from_slice(&row[..row_bytes]);
        }
        Ok(out)
    }

    /// Blocking read of a float image as interleaved RGBA f32.
    pub fn read_image_f32(&self, image: &MemoryObject) -> ComputeResult<Vec<f32>> {
        match image.image_format() {
            Some(f) if f == crate::memory::ImageFormat::RGBA32F => {}
            _ => {
                return Err(ComputeError::Readback(format!(
                    "'{}' is not an rgba32float image",
                    image.name
                )));
            }
        }
        let bytes = self.read_image_bytes(image)?;
        Ok(floats(&bytes))
    }

    /// Blocking read of a buffer as f32 values.
    pub fn read_buffer_f32(&self, buffer: &MemoryObject) -> ComputeResult<Vec<f32>> {
        self.check_device("buffer", &buffer.name, buffer.device)?;
        let (MemoryKind::Buffer { size }, Some(raw)) = (buffer.kind, buffer.buffer()) else {
            return Err(ComputeError::Readback(format!("'{}' is not a buffer", buffer.name)));
        };

        let (staging, err) = self.handle.scoped(|device| {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("colorxfer::readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("colorxfer::readback"),
            });
            encoder.copy_buffer_to_buffer(raw, 0, &staging, 0, size);
            self.handle.queue.submit(std::iter::once(encoder.finish()));
            staging
        });
        if let Some(err) = err {
            return Err(ComputeError::Readback(format!("{}: {err}", buffer.name)));
        }

        let bytes = map_blocking(&self.handle.device, &staging)?;
        Ok(floats(&bytes))
    }

    fn check_device(&self, what: &str, name: &str, device: DeviceId) -> ComputeResult<()> {
        if device != self.device.id {
            return Err(ComputeError::ContextMismatch(format!(
                "{what} '{name}' lives on device {device}, queue '{}' submits to {}",
                self.name, self.device.id
            )));
        }
        Ok(())
    }
}

/// Map `staging` for reading, wait for the GPU and copy the bytes out.
fn map_blocking(device: &wgpu::Device, staging: &wgpu::Buffer) -> ComputeResult<Vec<u8>> {
    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| ComputeError::Readback("map callback never fired".into()))?
        .map_err(|e| ComputeError::Readback(e.to_string()))?;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

/// Round `value` up to a multiple of `alignment`.
fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Mapped bytes as f32. Copies, so `bytes` need not be 4-byte aligned.
fn floats(bytes: &[u8]) -> Vec<f32> {
    bytemuck::pod_collect_to_vec(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(4 * 16, 256), 256);
        assert_eq!(align_to(17 * 16, 256), 512);
    }

    #[test]
    fn floats_from_unaligned_bytes() {
        let values = [1.5f32, -0.25, 1024.0];
        let mut raw = vec![0u8];
        raw.extend_from_slice(bytemuck::cast_slice(&values));
        assert_eq!(floats(&raw[1..]), values);
    }
}
