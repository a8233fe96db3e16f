//! In-memory image operations — pure Rust, zero external dependencies.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Detect** | extension + declared type (`codec::detect_format`) |
//! | **Decode (web rasters)** | `image` crate (pure Rust decoders) |
//! | **Decode (HEIF family)** | `avif-parse` (container) + `rav1d` (AV1) + custom YUV→RGB |
//! | **Normalize → JPEG** | decode + `JpegEncoder` at fixed quality |
//! | **Compress** | Lanczos3 resize + JPEG re-encode within budget |
//!
//! The module is split into:
//! - **Calculations**: pure functions for dimension math (unit testable)
//! - **Codec**: format detection and byte-level decode/encode
//! - **Normalize**: best-effort conversion to the canonical encoding
//! - **Compress**: best-effort fit into the size/resolution budget
//!
//! Both high-level operations share one failure policy: any decode or
//! encode error returns the input untouched. A pipeline image is never
//! lost to an imaging failure.

mod calculations;
pub(crate) mod codec;
mod compress;
mod normalize;

pub use calculations::fit_within;
pub use compress::compress;
pub use normalize::{CANONICAL_CONTENT_TYPE, CANONICAL_EXTENSION, canonical_name, normalize};
