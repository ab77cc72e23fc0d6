//! Device programs: WGSL source validated with naga, compiled for one device.

use tracing::{debug, error};

use crate::discovery::DeviceId;
use crate::provider::WgpuDevice;
use crate::{ComputeError, ComputeResult};

/// Parsed and validated WGSL module.
///
/// Validation runs on the host before anything touches the device, so a
/// build failure carries naga's rendered diagnostics (with source spans)
/// instead of an opaque driver error.
pub(crate) struct Validated {
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

pub(crate) fn validate(name: &str, source: &str) -> ComputeResult<Validated> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ComputeError::ProgramBuild {
        name: name.to_string(),
        log: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator.validate(&module).map_err(|e| ComputeError::ProgramBuild {
        name: name.to_string(),
        log: e.emit_to_string(source),
    })?;

    Ok(Validated { module, info })
}

/// Compiled program bound to one device of a context.
pub struct Program {
    pub name: String,
    pub context: String,
    pub device: DeviceId,
    pub(crate) source: String,
    pub(crate) module: naga::Module,
    pub(crate) info: naga::valid::ModuleInfo,
    pub(crate) shader: wgpu::ShaderModule,
    pub(crate) gpu: WgpuDevice,
}

impl Program {
    /// Validate `source` and create the shader module on `gpu`.
    pub(crate) fn build(
        name: String,
        context: String,
        device: DeviceId,
        gpu: &WgpuDevice,
        source: String,
    ) -> ComputeResult<Self> {
        let Validated { module, info } = match validate(&name, &source) {
            Ok(v) => v,
            Err(e) => {
                error!(program = %name, "Program build failed: {e}");
                return Err(e);
            }
        };

        let (shader, err) = gpu.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&name),
                source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
            })
        });
        if let Some(err) = err {
            error!(program = %name, "Shader module rejected by device: {err}");
            return Err(ComputeError::ProgramBuild {
                name,
                log: err.to_string(),
            });
        }

        debug!(
            program = %name,
            entry_points = ?module.entry_points.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            "Program built"
        );

        Ok(Self {
            name,
            context,
            device,
            source,
            module,
            info,
            shader,
            gpu: gpu.clone(),
        })
    }

    /// Names of the compute entry points.
    pub fn entry_points(&self) -> Vec<&str> {
        self.module
            .entry_points
            .iter()
            .filter(|e| e.stage == naga::ShaderStage::Compute)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Program source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn entry_index(&self, entry: &str) -> Option<usize> {
        self.module
            .entry_points
            .iter()
            .position(|e| e.name == entry && e.stage == naga::ShaderStage::Compute)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("device", &self.device)
            .field("entry_points", &self.entry_points())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_carry_diagnostics() {
        let err = validate("broken", "@compute @workgroup_size(1) fn main( {}").err().unwrap();
        match err {
            ComputeError::ProgramBuild { name, log } => {
                assert_eq!(name, "broken");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_errors_are_reported() {
        let src = "@compute @workgroup_size(1) fn main() { let x: f32 = 1u; }";
        assert!(matches!(validate("typed", src), Err(ComputeError::ProgramBuild { .. })));
    }

    #[test]
    fn valid_source_passes() {
        let src = "@compute @workgroup_size(1, 1, 1) fn main(@builtin(global_invocation_id) id: vec3<u32>) {}";
        let v = validate("ok", src).unwrap();
        assert_eq!(v.module.entry_points.len(), 1);
        assert_eq!(v.module.entry_points[0].workgroup_size, [1, 1, 1]);
    }
}
