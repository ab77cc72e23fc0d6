//! # colorxfer-transfer
//!
//! Statistical color transfer in CIE L*a*b*.
//!
//! Both images are converted to LAB on the device, per-channel mean and
//! standard deviation are reduced on the host, and the source is remapped so
//! its channels carry the target's statistics:
//!
//! ```text
//! out = (p - src_mean) * (tgt_std / src_std) + tgt_mean
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`config`] | Device preference, vendor priority lists, paths |
//! | [`lab`] | sRGB <-> LAB on the host |
//! | [`stats`] | Non-mutating mean / sample std-dev reduction |
//! | [`pipeline`] | Resource selection and dispatch sequencing |
//! | [`output`] | PNG output stage |
//!
//! # Example
//!
//! ```ignore
//! use colorxfer_compute::{ResourceManager, WgpuProvider};
//! use colorxfer_transfer::{transfer_files, TransferConfig};
//!
//! let mut rm = ResourceManager::new(WgpuProvider::new());
//! rm.discover();
//! let paths = transfer_files(&mut rm, TransferConfig::from_env(), "a.png".as_ref(), "b.jpg".as_ref())?;
//! ```

pub mod config;
pub mod lab;
pub mod output;
pub mod pipeline;
pub mod stats;

mod error;

pub use config::{parse_resolution, DeviationCenter, SelectionPlan, TransferConfig};
pub use error::{TransferError, TransferResult};
pub use output::{write_outputs, OutputPaths};
pub use pipeline::{select_resources, ColorTransfer, LabImage, TransferOutput};
pub use stats::{LabStats, TransferStats};

use std::path::Path;

use colorxfer_compute::{DeviceProvider, ResourceManager, WgpuDevice};

/// Run the whole pipeline on two files and write the three outputs.
pub fn transfer_files<P: DeviceProvider<Device = WgpuDevice>>(
    rm: &mut ResourceManager<P>,
    config: TransferConfig,
    source: &Path,
    target: &Path,
) -> TransferResult<OutputPaths> {
    let mut session = ColorTransfer::new(rm, config)?;
    let result = session.run_files(source, target)?;
    write_outputs(&result, session.config())
}
