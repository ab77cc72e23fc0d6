//! # colorxfer-io
//!
//! Image codec adapter for the colorxfer pipeline.
//!
//! The compute side only ever sees two shapes of pixels: 8-bit RGBA going in
//! and 32-bit float coming out. This crate decodes common raster files into
//! [`ImageData`], expands them to RGBA8 for upload, and encodes float results
//! back to 8-bit PNG.
//!
//! | Format | Read | Write |
//! |--------|------|-------|
//! | PNG | 1-16 bit gray, gray+alpha, RGB, RGBA, palette | 8-bit |
//! | JPEG | RGB, L8, L16, CMYK | - |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use colorxfer_io::{read, write};
//!
//! let image = read("input.jpg")?;
//! let rgba = image.to_rgba8();
//! write("copy.png", &image)?;
//! ```

#![warn(missing_docs)]

mod detect;
mod error;

#[cfg(feature = "png")]
pub mod png;

#[cfg(feature = "jpeg")]
pub mod jpeg;

pub use detect::Format;
pub use error::{IoError, IoResult};

use std::path::Path;
use tracing::debug;

/// Decode `path`. The codec is picked from the file header, falling back to
/// the extension.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<ImageData> {
    let path = path.as_ref();
    let format = Format::detect(path)?;
    debug!(path = %path.display(), ?format, "Decoding image");

    match format {
        #[cfg(feature = "png")]
        Some(Format::Png) => png::read(path),
        #[cfg(feature = "jpeg")]
        Some(Format::Jpeg) => jpeg::read(path),
        _ => Err(IoError::UnsupportedFormat(extension_of(path))),
    }
}

/// Encode `image` to `path`. Only `.png` is accepted.
pub fn write<P: AsRef<Path>>(path: P, image: &ImageData) -> IoResult<()> {
    let path = path.as_ref();
    match Format::from_extension(path) {
        #[cfg(feature = "png")]
        Some(Format::Png) => png::write(path, image),
        _ => Err(IoError::UnsupportedFormat(extension_of(path))),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Host image
// ============================================================================

/// Interleaved samples at their decoded precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// 8-bit, full range 0..=255.
    U8(Vec<u8>),
    /// 16-bit, full range 0..=65535.
    U16(Vec<u16>),
    /// Float, nominal range 0..1.
    F32(Vec<f32>),
}

impl Samples {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// True when no samples are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded image in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Interleaved channels per pixel: 1 gray, 2 gray+alpha, 3 RGB, 4 RGBA.
    pub channels: u32,
    /// Sample storage, `width * height * channels` long.
    pub samples: Samples,
}

impl ImageData {
    /// Image over 8-bit samples.
    pub fn from_u8(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            samples: Samples::U8(data),
        }
    }

    /// Image over float samples in 0..1.
    pub fn from_f32(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Self {
        Self {
            width,
            height,
            channels,
            samples: Samples::F32(data),
        }
    }

    /// RGBA8 image; fails when `data` is not `width * height * 4` long.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> IoResult<Self> {
        let image = Self::from_u8(width, height, 4, data);
        image.check_len()?;
        Ok(image)
    }

    /// `width * height * channels`.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub(crate) fn check_len(&self) -> IoResult<()> {
        let expected = self.expected_len();
        match self.samples.len() {
            actual if actual == expected => Ok(()),
            actual => Err(IoError::DimensionMismatch { expected, actual }),
        }
    }

    /// Samples scaled to 0..1.
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.samples {
            Samples::U8(v) => v.iter().map(|&s| s as f32 / 255.0).collect(),
            Samples::U16(v) => v.iter().map(|&s| s as f32 / 65535.0).collect(),
            Samples::F32(v) => v.clone(),
        }
    }

    /// Samples as 8-bit; 16-bit keeps the high byte, floats go through [`quantize`].
    pub fn to_u8(&self) -> Vec<u8> {
        match &self.samples {
            Samples::U8(v) => v.clone(),
            Samples::U16(v) => v.iter().map(|&s| (s >> 8) as u8).collect(),
            Samples::F32(v) => v.iter().copied().map(quantize).collect(),
        }
    }

    /// Interleaved RGBA8. Gray is replicated and missing alpha is opaque.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let s = self.to_u8();
        let n = self.channels.clamp(1, 4) as usize;
        let mut out = Vec::with_capacity(s.len() / n * 4);
        for px in s.chunks_exact(n) {
            let rgba = match *px {
                [g] => [g, g, g, 255],
                [g, a] => [g, g, g, a],
                [r, g, b] => [r, g, b, 255],
                [r, g, b, a, ..] => [r, g, b, a],
                [] => continue,
            };
            out.extend_from_slice(&rgba);
        }
        out
    }
}

/// Clamp to 0..1 and round to the nearest 8-bit code.
#[inline]
pub fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_expansion() {
        let rgb = ImageData::from_u8(2, 1, 3, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(rgb.to_rgba8(), vec![1, 2, 3, 255, 4, 5, 6, 255]);

        let ga = ImageData::from_u8(1, 1, 2, vec![9, 100]);
        assert_eq!(ga.to_rgba8(), vec![9, 9, 9, 100]);

        let g = ImageData::from_u8(2, 1, 1, vec![7, 8]);
        assert_eq!(g.to_rgba8(), vec![7, 7, 7, 255, 8, 8, 8, 255]);
    }

    #[test]
    fn quantize_rounds_and_clamps() {
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(2.0), 255);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(10.0 / 255.0), 10);
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() {
        let img = ImageData {
            width: 1,
            height: 1,
            channels: 1,
            samples: Samples::U16(vec![0xAB12]),
        };
        assert_eq!(img.to_u8(), vec![0xAB]);
        assert!((img.to_f32()[0] - 0xAB12 as f32 / 65535.0).abs() < 1e-7);
    }

    #[test]
    fn from_rgba8_checks_length() {
        assert!(ImageData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageData::from_rgba8(2, 2, vec![0; 12]),
            Err(IoError::DimensionMismatch { expected: 16, actual: 12 })
        ));
    }

    #[test]
    fn write_rejects_non_png() {
        let image = ImageData::from_u8(1, 1, 4, vec![0; 4]);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            write(dir.path().join("out.jpg"), &image),
            Err(IoError::UnsupportedFormat(ext)) if ext == "jpg"
        ));
    }
}
