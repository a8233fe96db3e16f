//! Compression — fit the canonical payload into the size/resolution budget.
//!
//! Expects canonical JPEG input (the normalizer runs first). The contract:
//!
//! - A file already within both the dimension cap and the byte budget is
//!   returned byte-identical — no re-encode, no quality loss.
//! - A file over the dimension cap is resized (Lanczos3) to fit, even when
//!   it is under the byte budget.
//! - Output is never larger than input; when the re-encode doesn't shrink
//!   the file, the input is kept.
//! - Non-canonical input (a normalization fallback, e.g. an HEVC HEIC we
//!   couldn't decode) and any decode/encode failure pass through unchanged
//!   — same best-effort policy as normalization.

use crate::config::EncodingConfig;
use crate::imaging::calculations::fit_within;
use crate::imaging::codec::{self, SourceFormat};
use crate::types::SelectedFile;
use bytes::Bytes;
use image::imageops::FilterType;
use tracing::debug;

/// Bring a file at or below the configured budget, best-effort.
pub fn compress(file: SelectedFile, encoding: &EncodingConfig) -> SelectedFile {
    if codec::detect_format(&file.name, &file.content_type) != SourceFormat::Jpeg {
        return file;
    }

    match shrink(&file, encoding) {
        Ok(Some(smaller)) => smaller,
        Ok(None) => file,
        Err(err) => {
            debug!(file = %file.name, error = %err, "compression fell back to original");
            file
        }
    }
}

/// `Ok(None)` means "keep the input" — already within budget, or the
/// re-encode didn't shrink it.
fn shrink(
    file: &SelectedFile,
    encoding: &EncodingConfig,
) -> Result<Option<SelectedFile>, codec::CodecError> {
    let over_budget = file.len() as u64 > encoding.byte_budget;

    let img = codec::decode(&file.bytes, SourceFormat::Jpeg)?;
    let resize_to = fit_within((img.width(), img.height()), encoding.max_dimension);

    if !over_budget && resize_to.is_none() {
        return Ok(None);
    }

    let img = match resize_to {
        Some((width, height)) => img.resize(width, height, FilterType::Lanczos3),
        None => img,
    };

    let encoded = codec::encode_jpeg(&img, encoding.compress_quality)?;
    if encoded.len() >= file.len() {
        debug!(file = %file.name, "re-encode did not shrink the file; keeping input");
        return Ok(None);
    }

    Ok(Some(SelectedFile::new(
        file.name.clone(),
        file.content_type.clone(),
        Bytes::from(encoded),
    )))
}
