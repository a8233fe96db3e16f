//! Shared types used across all pipeline stages.
//!
//! Every stage reads and writes [`ImageRecord`] values through the registry;
//! the record is the single unit of reconciliation between validation,
//! normalization, compression, and upload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Opaque identifier for an image record.
///
/// Assigned once at selection time and stable for the record's lifetime.
/// Async completions address the registry by id, never by index, so a
/// record removed mid-flight simply makes later writes no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a record sits in its linear pipeline.
///
/// ```text
/// Placeholder → Normalizing → Compressing → Compressed → Uploading → Finalized
///                                                                 └→ Failed
/// ```
///
/// Normalization and compression errors never reach `Failed`; they fall
/// back to the original payload and continue as `Compressed`. `Failed` is
/// reserved for upload errors and is retryable (the payload and preview
/// stay intact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Placeholder,
    Normalizing,
    Compressing,
    Compressed,
    Uploading,
    Finalized,
    Failed,
}

impl Phase {
    /// Terminal success state; monotonic — a finalized record never leaves it.
    pub fn is_finalized(self) -> bool {
        self == Self::Finalized
    }

    /// True while pipeline work for the record is in flight.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Normalizing | Self::Compressing | Self::Uploading)
    }

    pub fn is_uploading(self) -> bool {
        self == Self::Uploading
    }
}

/// A user-selected file: name, declared content type, and the bytes.
///
/// The payload is exclusively owned by whichever record holds the file;
/// pipeline steps replace the whole value (original → normalized →
/// compressed), never mutate it in place. `Bytes` makes the replacement
/// cheap — clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    /// Declared MIME type. Unreliable for phone-camera formats, which often
    /// arrive as `application/octet-stream` or empty — format detection
    /// checks the extension too.
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the content type from the extension.
    ///
    /// Convenience for hosts that hand the pipeline paths from a native
    /// file dialog rather than already-loaded buffers.
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let bytes = Bytes::from(std::fs::read(path)?);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type_for_extension(&extension_of(&name)).to_string();
        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased filename extension, empty if there is none.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

/// Lowercased extension of a bare filename, empty if absent.
pub(crate) fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Declared MIME type for a known raster extension, or `application/octet-stream`.
pub(crate) fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// The unit the pipeline operates on: one selected image and everything
/// known about it so far.
///
/// Serialized snapshots omit the payload — the host renders records via
/// `display_address`, not raw bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub id: ImageId,
    /// The currently-authoritative payload (original, normalized, or
    /// compressed). Replaced wholesale as the pipeline progresses.
    #[serde(skip)]
    pub source_file: SelectedFile,
    /// What the host renders right now: a temporary `preview://…` handle
    /// before upload, the permanent remote address after.
    pub display_address: String,
    /// Set once the remote store confirms. From then on `display_address`
    /// equals it and never reverts.
    pub uploaded_address: Option<String>,
    pub finalized: bool,
    pub phase: Phase,
    /// 0–100; meaningful only while `phase` is `Uploading`.
    pub progress: u8,
}

impl ImageRecord {
    /// A freshly-selected record: original payload, temporary preview
    /// address, no upload state.
    pub fn placeholder(id: ImageId, source_file: SelectedFile, display_address: String) -> Self {
        Self {
            id,
            source_file,
            display_address,
            uploaded_address: None,
            finalized: false,
            phase: Phase::Placeholder,
            progress: 0,
        }
    }
}
