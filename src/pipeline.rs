//! The ingestion pipeline — selection to finalized upload.
//!
//! Ties the stages together around the registry:
//!
//! ```text
//! select     validate → placeholder records + preview handles
//! run        per image: normalize → compress → upload  (images concurrent)
//! remove     drop a record and release its preview handle
//! ```
//!
//! Within one image the three steps are strictly sequential; across images
//! everything interleaves freely and completes unordered. Every write an
//! async step makes goes through the registry and is guarded on the
//! record's continued existence, so removing an image mid-flight silently
//! discards whatever its in-flight work eventually produces.
//!
//! Upload failures are isolated per image: one failed transfer leaves its
//! siblings untouched and is reported in the batch report naming the
//! file. Normalization and compression failures are not failures at all —
//! the original payload continues down the pipeline.

use crate::config::PipelineConfig;
use crate::imaging;
use crate::preview::{self, PreviewStats, PreviewStore};
use crate::registry::Registry;
use crate::types::{ImageId, ImageRecord, Phase, SelectedFile};
use crate::upload::{self, HttpTransport, ProgressFn, UploadError, UploadTransport};
use crate::validate::{self, SelectError};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One upload that failed, named for the user.
#[derive(Debug, Clone)]
pub struct UploadFailure {
    pub id: ImageId,
    pub filename: String,
    pub reason: String,
}

/// Outcome of one batch: which records finalized, which uploads failed.
/// Records removed mid-flight appear in neither list.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub finalized: Vec<ImageId>,
    pub failures: Vec<UploadFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Finalized(ImageId),
    Failed(UploadFailure),
    /// The record disappeared mid-flight (user removal); nothing to report.
    Discarded,
}

/// The pipeline facade a host embeds. Cheap to share behind an `Arc`;
/// every method takes `&self`.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<Registry>,
    previews: Arc<PreviewStore>,
    transport: Arc<dyn UploadTransport>,
}

impl Pipeline {
    /// A pipeline over the given transport, starting from an empty list.
    pub fn new(config: PipelineConfig, transport: Arc<dyn UploadTransport>) -> Self {
        Self::with_initial(config, transport, Vec::new())
    }

    /// A pipeline seeded with the host's current record list.
    pub fn with_initial(
        config: PipelineConfig,
        transport: Arc<dyn UploadTransport>,
        initial: Vec<ImageRecord>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new(initial)),
            previews: Arc::new(PreviewStore::new()),
            transport,
        }
    }

    /// A pipeline over the production HTTP transport.
    pub fn over_http(config: PipelineConfig) -> Result<Self, UploadError> {
        let transport = Arc::new(HttpTransport::new(&config.remote)?);
        Ok(Self::new(config, transport))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current record list snapshot.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.registry.snapshot()
    }

    /// Observe every registry write; this is the host UI's change feed.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ImageRecord>> {
        self.registry.subscribe()
    }

    /// Preview handle accounting (created / revoked / live).
    pub fn preview_stats(&self) -> PreviewStats {
        self.previews.stats()
    }

    /// The bytes behind a `preview://` address, for hosts that render
    /// previews themselves.
    pub fn resolve_preview(&self, address: &str) -> Option<bytes::Bytes> {
        self.previews.resolve(address)
    }

    /// Validate a selection and create placeholder records for it.
    ///
    /// All-or-nothing: on any violation no record is created. The capacity
    /// check runs inside the registry's critical section so concurrent
    /// selections cannot oversubscribe it.
    pub fn select(&self, files: Vec<SelectedFile>) -> Result<Vec<ImageId>, SelectError> {
        let previews = Arc::clone(&self.previews);
        let limits = self.config.limits.clone();
        self.registry.update(move |mirror| {
            validate::validate_selection(&files, mirror.len(), &limits)?;

            let mut ids = Vec::with_capacity(files.len());
            for file in files {
                let id = ImageId::new();
                let handle = previews.create(file.bytes.clone());
                ids.push(id);
                mirror.push(ImageRecord::placeholder(id, file, handle));
            }
            Ok(ids)
        })
    }

    /// Drive the given records through normalize → compress → upload, all
    /// images concurrently. Finalized records are never re-submitted.
    pub async fn run(&self, ids: &[ImageId]) -> BatchReport {
        let runnable: Vec<ImageId> = ids
            .iter()
            .copied()
            .filter(|&id| match self.registry.get(id) {
                Some(record) if record.finalized => {
                    warn!(%id, "not re-submitting a finalized record");
                    false
                }
                Some(_) => true,
                None => {
                    debug!(%id, "record removed before processing");
                    false
                }
            })
            .collect();

        let outcomes = join_all(runnable.iter().map(|&id| self.process_one(id))).await;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Finalized(id) => report.finalized.push(id),
                Outcome::Failed(failure) => report.failures.push(failure),
                Outcome::Discarded => {}
            }
        }
        info!(
            finalized = report.finalized.len(),
            failed = report.failures.len(),
            previews = %self.previews.stats(),
            "batch complete"
        );
        report
    }

    /// Select and run in one call.
    pub async fn ingest(&self, files: Vec<SelectedFile>) -> Result<BatchReport, SelectError> {
        let ids = self.select(files)?;
        Ok(self.run(&ids).await)
    }

    /// Remove a record and release its preview handle. Work already in
    /// flight for it is not stopped; its eventual completions find the id
    /// gone and discard themselves.
    pub fn remove(&self, id: ImageId) -> bool {
        match self.registry.remove(id) {
            Some(record) => {
                if preview::is_preview(&record.display_address) {
                    self.previews.revoke(&record.display_address);
                }
                debug!(%id, "record removed");
                true
            }
            None => false,
        }
    }

    /// One image's full chain. Every step re-reads the registry and bails
    /// out (`Discarded`) the moment the record is gone.
    async fn process_one(&self, id: ImageId) -> Outcome {
        // Normalize
        let Some(record) = self.registry.get(id) else {
            return Outcome::Discarded;
        };
        if !self.registry.update_record(id, |r| r.phase = Phase::Normalizing) {
            return Outcome::Discarded;
        }
        let quality = self.config.encoding.normalize_quality;
        let input = record.source_file;
        let fallback = input.clone();
        let normalized = tokio::task::spawn_blocking(move || imaging::normalize(input, quality))
            .await
            .unwrap_or(fallback);
        if !self.apply_payload(id, normalized, Phase::Compressing) {
            return Outcome::Discarded;
        }

        // Compress
        let Some(record) = self.registry.get(id) else {
            return Outcome::Discarded;
        };
        let encoding = self.config.encoding.clone();
        let input = record.source_file;
        let fallback = input.clone();
        let compressed =
            tokio::task::spawn_blocking(move || imaging::compress(input, &encoding))
                .await
                .unwrap_or(fallback);
        if !self.apply_payload(id, compressed, Phase::Compressed) {
            return Outcome::Discarded;
        }

        // Upload
        let Some(record) = self.registry.get(id) else {
            return Outcome::Discarded;
        };
        let file = record.source_file;
        let filename = file.name.clone();
        if !self.registry.update_record(id, |r| {
            r.phase = Phase::Uploading;
            r.progress = 0;
        }) {
            return Outcome::Discarded;
        }

        let target = match self
            .transport
            .issue_target(&file.name, &file.content_type)
            .await
        {
            Ok(target) => target,
            Err(err) => return self.fail(id, filename, err),
        };

        let registry = Arc::clone(&self.registry);
        let progress: ProgressFn = Arc::new(move |sent, total| {
            let pct = if total == 0 {
                100
            } else {
                ((sent.min(total) * 100) / total) as u8
            };
            // Guarded: the record may be gone, and progress never decreases
            registry.update_record(id, |r| {
                if r.phase.is_uploading() && pct > r.progress {
                    r.progress = pct;
                }
            });
        });

        if let Err(err) = self
            .transport
            .send(
                &target.upload_target,
                &file.content_type,
                file.bytes.clone(),
                progress,
            )
            .await
        {
            return self.fail(id, filename, err);
        }

        let permanent =
            upload::permanent_address(&self.config.remote.public_base_url, &target.object_key);
        let mut superseded = None;
        let present = self.registry.update_record(id, |r| {
            if preview::is_preview(&r.display_address) {
                superseded = Some(std::mem::replace(&mut r.display_address, permanent.clone()));
            } else {
                r.display_address = permanent.clone();
            }
            r.uploaded_address = Some(permanent.clone());
            r.finalized = true;
            r.phase = Phase::Finalized;
            r.progress = 100;
        });
        if let Some(old) = superseded {
            self.previews.revoke(&old);
        }
        if !present {
            return Outcome::Discarded;
        }
        info!(%id, address = %permanent, "image finalized");
        Outcome::Finalized(id)
    }

    /// Write a step's output payload through the registry, refreshing the
    /// preview handle only when the bytes actually changed. Returns `false`
    /// if the record no longer exists (the fresh handle is released).
    fn apply_payload(&self, id: ImageId, file: SelectedFile, next_phase: Phase) -> bool {
        let changed = self
            .registry
            .get(id)
            .map(|r| r.source_file.bytes != file.bytes)
            .unwrap_or(false);
        let fresh_handle = if changed {
            Some(self.previews.create(file.bytes.clone()))
        } else {
            None
        };

        let mut superseded = None;
        let handle_for_record = fresh_handle.clone();
        let present = self.registry.update_record(id, |r| {
            if let Some(handle) = handle_for_record {
                if preview::is_preview(&r.display_address) {
                    superseded = Some(std::mem::replace(&mut r.display_address, handle));
                } else {
                    r.display_address = handle;
                }
            }
            r.source_file = file;
            r.phase = next_phase;
        });

        if !present {
            if let Some(handle) = fresh_handle {
                self.previews.revoke(&handle);
            }
            return false;
        }
        if let Some(old) = superseded {
            // The old handle is no longer anyone's display address
            self.previews.revoke(&old);
        }
        true
    }

    fn fail(&self, id: ImageId, filename: String, err: UploadError) -> Outcome {
        warn!(%id, file = %filename, error = %err, "upload failed");
        let present = self.registry.update_record(id, |r| {
            // Payload and display address stay put so the user can retry
            r.phase = Phase::Failed;
            r.progress = 0;
        });
        if !present {
            return Outcome::Discarded;
        }
        Outcome::Failed(UploadFailure {
            id,
            filename,
            reason: err.to_string(),
        })
    }
}
