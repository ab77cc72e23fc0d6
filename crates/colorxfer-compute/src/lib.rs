//! Heterogeneous compute resource manager.
//!
//! Discovers compute platforms and devices, builds contexts and queues from
//! vendor + device-class queries, compiles device programs and creates
//! kernels, samplers and memory objects under named registries.
//!
//! # Architecture
//!
//! ```text
//! ResourceManager<P: DeviceProvider>
//!     +-- Discovery           (platforms -> devices, read-only)
//!     +-- Registry<ComputeContext>
//!     +-- Registry<CommandQueue>  --> enqueue_kernel / read_image_* / finish
//!     +-- Registry<Program>       (naga-validated WGSL)
//!     +-- Registry<Kernel>        (compute pipeline + argument slots)
//!     +-- Registry<Sampler>
//!     +-- Registry<MemoryObject>  (images, buffers)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use colorxfer_compute::{DeviceClass, DeviceQuery, ResourceManager, WgpuProvider};
//!
//! let mut rm = ResourceManager::new(WgpuProvider::new());
//! rm.discover();
//! let ctx = rm.get_context(&DeviceQuery::new("nvidia", DeviceClass::Gpu))
//!     .or_else(|| rm.get_context(&DeviceQuery::any(DeviceClass::Gpu)));
//! ```

pub mod context;
pub mod discovery;
pub mod kernel;
pub mod manager;
pub mod memory;
pub mod program;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod sampler;

pub use context::{CommandQueue, ComputeContext, ContextDevice};
pub use discovery::{DeviceClass, DeviceId, DeviceInfo, DeviceQuery, Discovery, PlatformInfo};
pub use kernel::{ArgKind, ArgSlot, Kernel, KernelArg};
pub use manager::{queue_key, ResourceManager};
pub use memory::{ElementType, ImageFormat, MemAccess, MemoryKind, MemoryObject};
pub use program::Program;
pub use provider::{DeviceProvider, MockDevice, MockProvider, WgpuDevice, WgpuProvider};
pub use registry::Registry;
pub use sampler::{AddressMode, FilterMode, Sampler, SamplerSpec};

use std::path::PathBuf;
use thiserror::Error;

/// Compute resource errors.
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already registered")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Failed to read program source {path}: {source}")]
    ProgramSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build program '{name}':\n{log}")]
    ProgramBuild { name: String, log: String },

    #[error("Entry point '{entry}' not found in program '{program}'")]
    KernelNotFound { program: String, entry: String },

    #[error("Failed to create kernel '{name}': {message}")]
    KernelCreation { name: String, message: String },

    #[error("Kernel '{kernel}' binding {binding}: {reason}")]
    UnsupportedArgument { kernel: String, binding: u32, reason: String },

    #[error("Kernel '{kernel}' has {count} argument(s), index {index} is out of range")]
    ArgumentIndex { kernel: String, index: usize, count: usize },

    #[error("Kernel '{kernel}' argument {index}: expected {expected}, got {actual}")]
    ArgumentMismatch {
        kernel: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("Kernel '{kernel}' argument {index} is not bound")]
    UnboundArgument { kernel: String, index: usize },

    #[error("Kernel '{kernel}' declares workgroup size {declared:?}, enqueue requested {requested:?}")]
    WorkgroupMismatch {
        kernel: String,
        declared: [u32; 3],
        requested: [u32; 2],
    },

    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    #[error("Invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),

    #[error("Image too large: {width}x{height} exceeds device limit {limit}")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Readback failed: {0}")]
    Readback(String),

    #[cfg(feature = "io")]
    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: colorxfer_io::IoError,
    },

    #[error("Compute operation failed: {0}")]
    OperationFailed(String),
}

pub type ComputeResult<T> = Result<T, ComputeError>;
