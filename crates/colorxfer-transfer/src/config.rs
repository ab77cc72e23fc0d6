//! Transfer configuration.
//!
//! # Environment Variables
//!
//! - `COLORXFER_DEVICE` - Device class to prefer ("cpu" or "gpu")
//! - `COLORXFER_PROGRAM` - Path of the device program

use std::env;
use std::path::{Path, PathBuf};

use colorxfer_compute::DeviceClass;

/// Default device program location, relative to the working directory.
pub const DEFAULT_PROGRAM: &str = "kernels/color_transfer.wgsl";

/// Diagnostic dump of the source image in LAB.
pub const SOURCE_LAB_FILE: &str = "outputSourceLAB.png";
/// Diagnostic dump of the target image in LAB.
pub const TARGET_LAB_FILE: &str = "outputTargetLAB.png";
/// Final transferred image.
pub const OUTPUT_FILE: &str = "output.png";

pub const ENV_DEVICE: &str = "COLORXFER_DEVICE";
pub const ENV_PROGRAM: &str = "COLORXFER_PROGRAM";

/// Which mean the target's standard deviation is measured about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviationCenter {
    /// The target's own mean (sample standard deviation).
    #[default]
    OwnMean,
    /// The source image's mean, as earlier releases computed it.
    SourceMean,
}

/// Vendor substrings tried in order when selecting a context and a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    pub contexts: Vec<String>,
    pub queues: Vec<String>,
    /// Try any device of the class once the named vendors are exhausted.
    pub any_fallback: bool,
}

impl SelectionPlan {
    /// Built-in priority lists for a device class.
    pub fn for_class(class: DeviceClass) -> Self {
        let (contexts, queues): (&[&str], &[&str]) = match class {
            DeviceClass::Cpu => (CPU_VENDORS, CPU_VENDORS),
            _ => (GPU_CONTEXT_VENDORS, GPU_QUEUE_VENDORS),
        };
        Self {
            contexts: contexts.iter().map(|s| s.to_string()).collect(),
            queues: queues.iter().map(|s| s.to_string()).collect(),
            any_fallback: true,
        }
    }

    /// The same explicit list for contexts and queues, no catch-all.
    pub fn vendors<S: AsRef<str>>(vendors: &[S]) -> Self {
        let list: Vec<String> = vendors.iter().map(|v| v.as_ref().to_string()).collect();
        Self {
            contexts: list.clone(),
            queues: list,
            any_fallback: false,
        }
    }

    /// Context candidates in order, with "" standing for any vendor.
    pub fn context_candidates(&self) -> Vec<&str> {
        with_fallback(&self.contexts, self.any_fallback)
    }

    /// Queue candidates in order, with "" standing for any vendor.
    pub fn queue_candidates(&self) -> Vec<&str> {
        with_fallback(&self.queues, self.any_fallback)
    }
}

fn with_fallback(list: &[String], any: bool) -> Vec<&str> {
    let mut out: Vec<&str> = list.iter().map(String::as_str).collect();
    if any && !out.contains(&"") {
        out.push("");
    }
    out
}

const CPU_VENDORS: &[&str] = &["intel", "amd", "llvmpipe", "lavapipe", "swiftshader", "microsoft"];

#[cfg(target_os = "macos")]
const GPU_CONTEXT_VENDORS: &[&str] = &["apple", "nvidia", "radeon", "amd"];
#[cfg(not(target_os = "macos"))]
const GPU_CONTEXT_VENDORS: &[&str] = &["nvidia", "radeon", "amd"];

#[cfg(target_os = "macos")]
const GPU_QUEUE_VENDORS: &[&str] = &["apple", "geforce", "nvidia", "radeon", "amd"];
#[cfg(not(target_os = "macos"))]
const GPU_QUEUE_VENDORS: &[&str] = &["geforce", "nvidia", "radeon", "amd"];

/// Everything a transfer run needs besides the two images.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Device class to select.
    pub preference: DeviceClass,
    /// Vendor priority lists.
    pub plan: SelectionPlan,
    /// Device program source.
    pub program_path: PathBuf,
    /// Directory receiving the three output files.
    pub output_dir: PathBuf,
    /// Fixed dispatch size; `None` sizes each stage from its input image.
    pub working_resolution: Option<(u32, u32)>,
    pub deviation_center: DeviationCenter,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            preference: DeviceClass::Gpu,
            plan: SelectionPlan::for_class(DeviceClass::Gpu),
            program_path: PathBuf::from(DEFAULT_PROGRAM),
            output_dir: PathBuf::from("."),
            working_resolution: None,
            deviation_center: DeviationCenter::OwnMean,
        }
    }
}

impl TransferConfig {
    /// Defaults with `COLORXFER_*` overrides applied.
    pub fn from_env() -> Self {
        Self::default().apply_env_with(|key| env::var(key).ok())
    }

    /// Apply overrides from `lookup` (environment-shaped).
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(class) = lookup(ENV_DEVICE).and_then(|v| v.parse::<DeviceClass>().ok()) {
            self = self.with_preference(class);
        }
        if let Some(path) = lookup(ENV_PROGRAM).filter(|p| !p.is_empty()) {
            self.program_path = PathBuf::from(path);
        }
        self
    }

    /// Prefer `class`, resetting the vendor lists to that class's defaults.
    pub fn with_preference(mut self, class: DeviceClass) -> Self {
        self.preference = class;
        self.plan = SelectionPlan::for_class(class);
        self
    }

    /// Replace both vendor lists.
    pub fn with_vendors<S: AsRef<str>>(mut self, vendors: &[S]) -> Self {
        self.plan = SelectionPlan::vendors(vendors);
        self
    }

    pub fn with_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.program_path = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_working_resolution(mut self, resolution: Option<(u32, u32)>) -> Self {
        self.working_resolution = resolution;
        self
    }

    pub fn with_deviation_center(mut self, center: DeviationCenter) -> Self {
        self.deviation_center = center;
        self
    }

    pub fn source_lab_path(&self) -> PathBuf {
        self.output_dir.join(SOURCE_LAB_FILE)
    }

    pub fn target_lab_path(&self) -> PathBuf {
        self.output_dir.join(TARGET_LAB_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_FILE)
    }

    pub fn program_path(&self) -> &Path {
        &self.program_path
    }
}

/// Parse `"WIDTHxHEIGHT"` (e.g. `1024x1024`). Zero sizes are rejected.
pub fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}
