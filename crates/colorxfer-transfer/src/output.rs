//! Output stage: LAB buffers to 8-bit PNG files.

use std::path::{Path, PathBuf};

use colorxfer_io::ImageData;
use tracing::info;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::lab::lab_to_rgba;
use crate::pipeline::{LabImage, TransferOutput};

/// Files written by [`write_outputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub source_lab: PathBuf,
    pub target_lab: PathBuf,
    pub output: PathBuf,
}

/// Map LAB into displayable 0..1 ranges for inspection.
///
/// `L / 100`, `(a + 128) / 255`, `(b + 128) / 255`, alpha unchanged.
pub fn lab_preview(image: &LabImage) -> ImageData {
    let data = image
        .data
        .chunks_exact(4)
        .flat_map(|p| [p[0] / 100.0, (p[1] + 128.0) / 255.0, (p[2] + 128.0) / 255.0, p[3]])
        .collect();
    ImageData::from_f32(image.width, image.height, 4, data)
}

/// Convert LAB back to sRGB.
pub fn lab_to_image(image: &LabImage) -> ImageData {
    ImageData::from_f32(image.width, image.height, 4, lab_to_rgba(&image.data))
}

/// Write the two LAB previews and the final image into the output directory.
pub fn write_outputs(result: &TransferOutput, config: &TransferConfig) -> TransferResult<OutputPaths> {
    std::fs::create_dir_all(&config.output_dir).map_err(|source| TransferError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let paths = OutputPaths {
        source_lab: config.source_lab_path(),
        target_lab: config.target_lab_path(),
        output: config.output_path(),
    };
    write_png(&paths.source_lab, &lab_preview(&result.source_lab))?;
    write_png(&paths.target_lab, &lab_preview(&result.target_lab))?;
    write_png(&paths.output, &lab_to_image(&result.transferred))?;
    Ok(paths)
}

fn write_png(path: &Path, image: &ImageData) -> TransferResult<()> {
    colorxfer_io::write(path, image).map_err(|source| TransferError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), width = image.width, height = image.height, "Wrote image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::TransferStats;
    use approx::assert_abs_diff_eq;

    fn lab(width: u32, height: u32, px: [f32; 4]) -> LabImage {
        LabImage {
            width,
            height,
            data: px.repeat((width * height) as usize),
        }
    }

    #[test]
    fn preview_ranges() {
        let img = lab_preview(&lab(1, 1, [50.0, -128.0, 127.0, 0.5]));
        let v = img.to_f32();
        assert_abs_diff_eq!(v[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v[2], 1.0, epsilon = 1e-6);
        assert_eq!(v[3], 0.5);
    }

    #[test]
    fn white_lab_becomes_white_rgb() {
        let img = lab_to_image(&lab(2, 1, [100.0, 0.0, 0.0, 1.0]));
        assert_eq!(img.to_u8(), vec![255; 8]);
    }

    #[test]
    fn writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransferConfig::default().with_output_dir(dir.path().join("out"));
        let result = TransferOutput {
            source_lab: lab(2, 2, [40.0, 10.0, -10.0, 1.0]),
            target_lab: lab(3, 1, [60.0, -5.0, 5.0, 1.0]),
            transferred: lab(2, 2, [60.0, -5.0, 5.0, 1.0]),
            stats: TransferStats::default(),
        };

        let paths = write_outputs(&result, &config).unwrap();
        assert!(paths.output.ends_with("out/output.png"));
        for p in [&paths.source_lab, &paths.target_lab, &paths.output] {
            assert!(p.exists(), "{} missing", p.display());
        }
        let target = colorxfer_io::read(&paths.target_lab).unwrap();
        assert_eq!((target.width, target.height), (3, 1));
    }
}
