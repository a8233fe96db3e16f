//! Selection validation — the gate in front of the pipeline.
//!
//! Runs before any record exists. A selection that fails any rule is
//! rejected in full: nothing is created, the registry is untouched, and
//! the caller gets one error naming the first offending file.
//!
//! ## Rules
//!
//! - Every file must be a recognized raster image, by extension or by
//!   declared content type (either is enough — phone-camera files often
//!   carry a useless declared type).
//! - No original may exceed the configured size ceiling, even though
//!   compression happens later.
//! - The selection plus the records already in the registry must not
//!   exceed the registry capacity.

use crate::config::LimitsConfig;
use crate::types::SelectedFile;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    #[error("{filename} is not a supported image format")]
    UnsupportedFormat { filename: String },
    #[error("{filename} is {size} bytes, over the {limit}-byte limit")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },
    #[error("selection of {selected} would exceed the {limit}-image limit ({existing} already added)")]
    TooManyImages {
        selected: usize,
        existing: usize,
        limit: usize,
    },
}

/// Extensions accepted at the boundary. Includes phone-camera formats the
/// normalizer handles best-effort.
const RECOGNIZED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif", "avif",
];

const RECOGNIZED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/heic",
    "image/heif",
    "image/avif",
];

/// True if either the extension or the declared type identifies a raster
/// image we accept.
pub fn is_recognized(file: &SelectedFile) -> bool {
    let ext = file.extension();
    RECOGNIZED_EXTENSIONS.contains(&ext.as_str())
        || RECOGNIZED_CONTENT_TYPES.contains(&file.content_type.to_ascii_lowercase().as_str())
}

/// Validate a whole selection against the limits and the current registry
/// occupancy. All-or-nothing: the first violation rejects the selection.
pub fn validate_selection(
    files: &[SelectedFile],
    existing: usize,
    limits: &LimitsConfig,
) -> Result<(), SelectError> {
    if existing + files.len() > limits.max_images {
        return Err(SelectError::TooManyImages {
            selected: files.len(),
            existing,
            limit: limits.max_images,
        });
    }

    for file in files {
        if !is_recognized(file) {
            return Err(SelectError::UnsupportedFormat {
                filename: file.name.clone(),
            });
        }
        let size = file.len() as u64;
        if size > limits.max_source_bytes {
            return Err(SelectError::FileTooLarge {
                filename: file.name.clone(),
                size,
                limit: limits.max_source_bytes,
            });
        }
    }

    Ok(())
}
