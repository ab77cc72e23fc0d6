//! PNG codec.
//!
//! Decoding expands palette and sub-byte gray to 8 bits and keeps the
//! file's channel count. Encoding is always 8-bit with an sRGB chunk.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tracing::trace;

use crate::{ImageData, IoError, IoResult, Samples};

fn decode_err(e: png::DecodingError) -> IoError {
    IoError::Decode {
        codec: "PNG",
        message: e.to_string(),
    }
}

fn encode_err(e: png::EncodingError) -> IoError {
    IoError::Encode(e.to_string())
}

/// Decode a PNG file.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<ImageData> {
    let path = path.as_ref();
    trace!(path = %path.display(), "png::read");

    let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info().map_err(decode_err)?;

    let (color, depth) = reader.output_color_type();
    let channels = match color {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb => 3,
        png::ColorType::Rgba => 4,
        png::ColorType::Indexed => {
            return Err(IoError::UnsupportedLayout("unexpanded palette".into()));
        }
    };

    let size = reader
        .output_buffer_size()
        .ok_or_else(|| IoError::UnsupportedLayout("frame too large".into()))?;
    let mut buf = vec![0u8; size];
    let frame = reader.next_frame(&mut buf).map_err(decode_err)?;
    buf.truncate(frame.buffer_size());

    let samples = match depth {
        png::BitDepth::Eight => Samples::U8(buf),
        png::BitDepth::Sixteen => Samples::U16(
            buf.chunks_exact(2)
                .map(|be| u16::from_be_bytes([be[0], be[1]]))
                .collect(),
        ),
        other => {
            return Err(IoError::UnsupportedLayout(format!("{color:?} at {other:?}")));
        }
    };

    let image = ImageData {
        width: frame.width,
        height: frame.height,
        channels,
        samples,
    };
    image.check_len()?;
    Ok(image)
}

/// Encode `image` as 8-bit PNG.
pub fn write<P: AsRef<Path>>(path: P, image: &ImageData) -> IoResult<()> {
    let path = path.as_ref();
    trace!(path = %path.display(), width = image.width, height = image.height, "png::write");

    let color = match image.channels {
        1 => png::ColorType::Grayscale,
        2 => png::ColorType::GrayscaleAlpha,
        3 => png::ColorType::Rgb,
        4 => png::ColorType::Rgba,
        n => return Err(IoError::UnsupportedLayout(format!("{n} channels"))),
    };
    image.check_len()?;

    let mut encoder = png::Encoder::new(BufWriter::new(File::create(path)?), image.width, image.height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_source_srgb(png::SrgbRenderingIntent::Perceptual);

    let mut writer = encoder.write_header().map_err(encode_err)?;
    writer.write_image_data(&image.to_u8()).map_err(encode_err)?;
    writer.finish().map_err(encode_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_roundtrip_is_exact() {
        let (w, h) = (16u32, 8u32);
        let data: Vec<u8> = (0..h)
            .flat_map(|y| (0..w).flat_map(move |x| [(x * 16) as u8, (y * 32) as u8, 64, 200]))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgba.png");
        write(&path, &ImageData::from_u8(w, h, 4, data.clone())).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!((loaded.width, loaded.height, loaded.channels), (w, h, 4));
        assert_eq!(loaded.samples, Samples::U8(data));
    }

    #[test]
    fn gray_keeps_one_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        write(&path, &ImageData::from_u8(3, 1, 1, vec![0, 128, 255])).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.channels, 1);
        assert_eq!(loaded.to_rgba8()[4..8], [128, 128, 128, 255]);
    }

    #[test]
    fn write_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let err = write(dir.path().join("short.png"), &ImageData::from_u8(4, 4, 4, vec![0; 10])).unwrap_err();
        assert!(matches!(err, IoError::DimensionMismatch { expected: 64, actual: 10 }));
    }
}
