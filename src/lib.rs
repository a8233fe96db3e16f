//! # pixlift
//!
//! Client-side image ingestion and upload pipeline for marketplace listing
//! apps. The host hands over user-selected files; pixlift normalizes their
//! encoding, compresses them within budget, uploads them concurrently to
//! remote storage via per-file signed targets, and reconciles every result
//! into one shared record list the host renders from.
//!
//! # Architecture: One List, Three Stages
//!
//! Every image moves through three stages, and every transition is written
//! through a single registry:
//!
//! ```text
//! 1. Normalize   anything → canonical JPEG      (best-effort, in memory)
//! 2. Compress    JPEG → ≤1920px / ~2 MiB        (never larger than input)
//! 3. Upload      signed target → byte transfer → permanent address
//! ```
//!
//! Stages for different images interleave freely on the async runtime;
//! stages for one image never reorder. The registry is the only shared
//! mutable state, and each of its writes is one synchronous critical
//! section — that is what makes ten concurrent per-image chains safe
//! without any task ever holding a stale copy of the list.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `ImageRecord`, `Phase`, `SelectedFile` — the shared record every stage reads and writes |
//! | [`config`] | `PipelineConfig` — limits, encoding budget, remote endpoints; TOML-loadable |
//! | [`validate`] | Selection gate: recognized formats, size ceiling, batch limit; all-or-nothing |
//! | [`registry`] | The mirror: linearizable writes, existence guards, snapshot broadcast |
//! | [`preview`] | Temporary `preview://` handles with idempotent revocation |
//! | [`imaging`] | Decode/encode, normalization, compression — pure Rust, in memory |
//! | [`upload`] | `UploadTransport` seam + reqwest production transport with streamed progress |
//! | [`pipeline`] | The facade: select, run, remove, batch report |
//!
//! # Design Decisions
//!
//! ## Canonical JPEG
//!
//! All payloads normalize to JPEG before upload. Marketplace listing
//! services universally accept it, and a single canonical encoding keeps
//! the compressor and the upload path format-blind. Phone-camera
//! HEIF-family files are decoded in pure Rust (`avif-parse` + `rav1d`)
//! when AV1-coded; when they are not decodable, normalization falls back
//! to the original file — it is an optimization, never a gate.
//!
//! ## Best-Effort Imaging, Loud Uploads
//!
//! Normalization and compression failures substitute the original file
//! and continue silently; only upload errors surface to the user, naming
//! the file, and only for that image. One image's failure never blocks a
//! sibling.
//!
//! ## No Cancellation Primitive
//!
//! Removing an image mid-flight does not stop work already started.
//! Instead, every async completion checks the record still exists before
//! writing. A removed id turns every late completion into a no-op, which
//! is cheaper and simpler than plumbing cancellation through decode,
//! encode, and transfer.
//!
//! ## Transport as a Seam
//!
//! The orchestrator only knows the two-step signed-target protocol
//! through the [`upload::UploadTransport`] trait. Tests drive the entire
//! pipeline — progress, partial failure, mid-flight removal — with stub
//! transports; production uses the reqwest implementation.

pub mod config;
pub mod imaging;
pub mod pipeline;
pub mod preview;
pub mod registry;
pub mod types;
pub mod upload;
pub mod validate;
