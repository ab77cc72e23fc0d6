//! Codec adapter round-trip tests.

use approx::assert_abs_diff_eq;
use colorxfer_io::{read, write, Format, ImageData, IoError, Samples};

#[test]
fn float_roundtrip_within_half_step() {
    let (w, h) = (8u32, 4u32);
    let data: Vec<f32> = (0..w * h * 4).map(|i| (i as f32 * 0.013) % 1.0).collect();
    let image = ImageData::from_f32(w, h, 4, data.clone());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("float.png");
    write(&path, &image).unwrap();

    let loaded = read(&path).unwrap();
    assert!(matches!(loaded.samples, Samples::U8(_)));
    for (a, b) in loaded.to_f32().iter().zip(&data) {
        assert_abs_diff_eq!(*a, *b, epsilon = 0.5 / 255.0 + 1e-6);
    }
}

#[test]
fn rgb_png_expands_to_opaque_rgba() {
    let image = ImageData::from_u8(2, 2, 3, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.png");
    write(&path, &image).unwrap();

    let rgba = read(&path).unwrap().to_rgba8();
    assert_eq!(rgba.len(), 16);
    assert_eq!(&rgba[0..4], &[10, 20, 30, 255]);
    assert_eq!(&rgba[12..16], &[100, 110, 120, 255]);
}

#[test]
fn format_detected_from_content_not_name() {
    let image = ImageData::from_u8(1, 1, 4, vec![1, 2, 3, 4]);
    let dir = tempfile::tempdir().unwrap();
    let png_path = dir.path().join("real.png");
    write(&png_path, &image).unwrap();

    let disguised = dir.path().join("disguised.jpg");
    std::fs::copy(&png_path, &disguised).unwrap();

    assert_eq!(Format::detect(&disguised).unwrap(), Some(Format::Png));
    assert_eq!(read(&disguised).unwrap().to_u8(), vec![1, 2, 3, 4]);
}

#[test]
fn missing_and_unknown_files_fail() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(read(dir.path().join("nope.png")), Err(IoError::Io(_))));

    let junk = dir.path().join("junk.bmp");
    std::fs::write(&junk, b"not an image at all").unwrap();
    assert!(matches!(read(&junk), Err(IoError::UnsupportedFormat(ext)) if ext == "bmp"));
}
