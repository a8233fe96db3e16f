//! Format normalization — everything becomes canonical JPEG, best-effort.
//!
//! Given one selected file, return a file in the canonical encoding:
//!
//! - JPEG input passes through untouched.
//! - Alternate web rasters (PNG, WebP, TIFF, GIF, BMP) are decoded in
//!   memory and re-encoded as JPEG at a fixed quality.
//! - Phone-camera HEIF-family files are decoded via the container parser +
//!   AV1 decoder and re-encoded the same way; the filename extension is
//!   rewritten to match.
//! - Anything that fails to decode or encode comes back untouched.
//!   Normalization is an optimization, never a hard requirement — a
//!   failure here must not stop the image from uploading.

use crate::imaging::codec::{self, SourceFormat};
use crate::types::SelectedFile;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// Extension every normalized payload carries.
pub const CANONICAL_EXTENSION: &str = "jpg";

/// Content type every normalized payload declares.
pub const CANONICAL_CONTENT_TYPE: &str = "image/jpeg";

/// Convert a file to the canonical encoding, or return it unchanged when
/// it already is — or when conversion fails.
pub fn normalize(file: SelectedFile, quality: u8) -> SelectedFile {
    let format = codec::detect_format(&file.name, &file.content_type);
    match format {
        SourceFormat::Jpeg | SourceFormat::Unknown => file,
        SourceFormat::Raster(_) | SourceFormat::HeifFamily => {
            match reencode(&file, format, quality) {
                Ok(converted) => converted,
                Err(err) => {
                    debug!(file = %file.name, error = %err, "normalization fell back to original");
                    file
                }
            }
        }
    }
}

fn reencode(
    file: &SelectedFile,
    format: SourceFormat,
    quality: u8,
) -> Result<SelectedFile, codec::CodecError> {
    let img = codec::decode(&file.bytes, format)?;
    let encoded = codec::encode_jpeg(&img, quality)?;
    Ok(SelectedFile::new(
        canonical_name(&file.name),
        CANONICAL_CONTENT_TYPE,
        Bytes::from(encoded),
    ))
}

/// Rewrite a filename's extension to the canonical one.
///
/// `IMG_0042.heic` → `IMG_0042.jpg`; a name without an extension gets one
/// appended.
pub fn canonical_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.to_string());
    format!("{stem}.{CANONICAL_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::tests::{test_avif, test_jpeg, test_png};

    fn selected(name: &str, content_type: &str, bytes: Vec<u8>) -> SelectedFile {
        SelectedFile::new(name, content_type, Bytes::from(bytes))
    }

    #[test]
    fn jpeg_passes_through_byte_identical() {
        let file = selected("photo.jpg", "image/jpeg", test_jpeg(100, 80, 85));
        let original_bytes = file.bytes.clone();
        let normalized = normalize(file, 90);
        assert_eq!(normalized.name, "photo.jpg");
        assert_eq!(normalized.bytes, original_bytes);
    }

    #[test]
    fn png_is_reencoded_and_renamed() {
        let file = selected("scan.png", "image/png", test_png(64, 48));
        let normalized = normalize(file, 90);
        assert_eq!(normalized.name, "scan.jpg");
        assert_eq!(normalized.content_type, CANONICAL_CONTENT_TYPE);

        let img = codec::decode(&normalized.bytes, SourceFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn phone_camera_avif_is_reencoded_and_renamed() {
        // Declared type deliberately useless, as phones ship them
        let file = selected("IMG_0042.avif", "application/octet-stream", test_avif(64, 48));
        let normalized = normalize(file, 90);
        assert_eq!(normalized.name, "IMG_0042.jpg");
        assert_eq!(normalized.content_type, CANONICAL_CONTENT_TYPE);

        let img = codec::decode(&normalized.bytes, SourceFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn undecodable_heic_falls_back_untouched() {
        // HEVC-coded primary item: the container parse fails, the original
        // survives with its name and bytes intact
        let file = selected("IMG_0001.heic", "image/heic", b"not a real container".to_vec());
        let original = file.clone();
        assert_eq!(normalize(file, 90), original);
    }

    #[test]
    fn corrupt_png_falls_back_untouched() {
        let file = selected("broken.png", "image/png", b"\x89PNG but not really".to_vec());
        let original = file.clone();
        assert_eq!(normalize(file, 90), original);
    }

    #[test]
    fn unknown_format_falls_back_untouched() {
        let file = selected("mystery.bin", "application/octet-stream", vec![0u8; 16]);
        let original = file.clone();
        assert_eq!(normalize(file, 90), original);
    }

    #[test]
    fn canonical_name_rewrites_extension() {
        assert_eq!(canonical_name("IMG_0042.heic"), "IMG_0042.jpg");
        assert_eq!(canonical_name("scan.png"), "scan.jpg");
        assert_eq!(canonical_name("archive.tar.gz"), "archive.tar.jpg");
    }

    #[test]
    fn canonical_name_handles_missing_extension() {
        assert_eq!(canonical_name("pasted-image"), "pasted-image.jpg");
    }
}
