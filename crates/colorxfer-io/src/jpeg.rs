//! JPEG decoding. Outputs are PNG, so there is no encoder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::trace;

use crate::{ImageData, IoError, IoResult};

/// Decode a JPEG file to 8-bit gray or RGB. CMYK is converted to RGB.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<ImageData> {
    let path = path.as_ref();
    trace!(path = %path.display(), "jpeg::read");

    let decode_err = |message: String| IoError::Decode { codec: "JPEG", message };
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(File::open(path)?));
    let pixels = decoder.decode().map_err(|e| decode_err(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| decode_err("no frame header".into()))?;

    let (channels, data) = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => (3, pixels),
        jpeg_decoder::PixelFormat::L8 => (1, pixels),
        // Big-endian 16-bit luma; keep the high byte.
        jpeg_decoder::PixelFormat::L16 => (1, pixels.chunks_exact(2).map(|be| be[0]).collect()),
        jpeg_decoder::PixelFormat::CMYK32 => (3, pixels.chunks_exact(4).flat_map(cmyk_to_rgb).collect()),
    };

    let image = ImageData::from_u8(u32::from(info.width), u32::from(info.height), channels, data);
    image.check_len()?;
    Ok(image)
}

/// Profile-free CMYK to RGB.
fn cmyk_to_rgb(cmyk: &[u8]) -> [u8; 3] {
    let k = 1.0 - f32::from(cmyk[3]) / 255.0;
    let ink = |v: u8| ((1.0 - f32::from(v) / 255.0) * k * 255.0).round() as u8;
    [ink(cmyk[0]), ink(cmyk[1]), ink(cmyk[2])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmyk_extremes() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), [255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[255, 255, 255, 255]), [0, 0, 0]);
    }
}
