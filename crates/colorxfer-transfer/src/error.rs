//! Error types for the transfer pipeline.

use std::path::PathBuf;

use colorxfer_compute::{ComputeError, DeviceClass};
use colorxfer_io::IoError;
use thiserror::Error;

/// Transfer pipeline error.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Every vendor in the context priority list came up empty.
    #[error("Could not get a {class} context (tried: {tried})")]
    NoContext { class: DeviceClass, tried: String },

    /// No device of the selected context matched the queue priority list.
    #[error("Could not get a command queue on context '{context}' (tried: {tried})")]
    NoQueue { context: String, tried: String },

    /// Working resolution with a zero side.
    #[error("Invalid working resolution {0}x{1}")]
    InvalidResolution(u32, u32),

    /// Resource creation, binding, dispatch or readback failure.
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// Output encoding failure.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: IoError,
    },

    /// Output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Render a vendor list for error messages, "" shown as `*`.
pub(crate) fn tried_list(vendors: &[&str]) -> String {
    vendors
        .iter()
        .map(|v| if v.is_empty() { "*" } else { v })
        .collect::<Vec<_>>()
        .join(", ")
}
