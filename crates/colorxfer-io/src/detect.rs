//! Container sniffing.
//!
//! The file header decides; the extension is only consulted when the header
//! is not recognised.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::IoResult;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Container formats the adapter can route to a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Portable Network Graphics.
    Png,
    /// JPEG / JFIF, decode only.
    Jpeg,
}

impl Format {
    /// Format of the file at `path`, or `None` when neither header nor
    /// extension is recognised.
    pub fn detect<P: AsRef<Path>>(path: P) -> IoResult<Option<Self>> {
        let path = path.as_ref();
        let mut header = Vec::with_capacity(PNG_SIGNATURE.len());
        File::open(path)?
            .take(PNG_SIGNATURE.len() as u64)
            .read_to_end(&mut header)?;
        Ok(Self::sniff(&header).or_else(|| Self::from_extension(path)))
    }

    /// Match a file header against the known signatures.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if header.starts_with(JPEG_SOI) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// Guess from the file extension, case-insensitively.
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(Self::Jpeg),
            _ => None,
        }
    }
}
