//! End-to-end pipeline tests against the public API.
//!
//! Everything here drives `Pipeline` through stub implementations of the
//! public `UploadTransport` trait — no network, no filesystem beyond a
//! tempdir for the disk-read helper. The interesting scenarios are the
//! concurrent ones: mid-upload removal and out-of-order progress events.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, RgbImage};
use pixlift::config::PipelineConfig;
use pixlift::pipeline::Pipeline;
use pixlift::types::{ImageId, Phase, SelectedFile};
use pixlift::upload::{ProgressFn, SignedTarget, UploadError, UploadTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 85);
    encoder
        .encode(
            DynamicImage::ImageRgb8(img).to_rgb8().as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    buf
}

fn jpeg_file(name: &str) -> SelectedFile {
    SelectedFile::new(name, "image/jpeg", Bytes::from(jpeg_bytes(320, 240)))
}

fn test_config() -> PipelineConfig {
    PipelineConfig::from_toml_str(
        r#"
        [remote]
        issuer_url = "https://api.test/sign"
        public_base_url = "https://cdn.test"
        "#,
    )
    .unwrap()
}

/// Minimal always-succeeding transport.
struct OkTransport;

#[async_trait]
impl UploadTransport for OkTransport {
    async fn issue_target(
        &self,
        filename: &str,
        _content_type: &str,
    ) -> Result<SignedTarget, UploadError> {
        Ok(SignedTarget {
            upload_target: format!("https://store.test/put/{filename}"),
            object_key: format!("listings/{filename}"),
        })
    }

    async fn send(
        &self,
        _target: &str,
        _content_type: &str,
        bytes: Bytes,
        progress: ProgressFn,
    ) -> Result<(), UploadError> {
        let total = bytes.len() as u64;
        progress(total, total);
        Ok(())
    }
}

/// Transport that reports two out-of-order progress events, then parks
/// until the test releases it. Lets tests observe a record mid-upload.
struct HangingTransport {
    release: Arc<Notify>,
}

#[async_trait]
impl UploadTransport for HangingTransport {
    async fn issue_target(
        &self,
        filename: &str,
        _content_type: &str,
    ) -> Result<SignedTarget, UploadError> {
        Ok(SignedTarget {
            upload_target: format!("https://store.test/put/{filename}"),
            object_key: format!("listings/{filename}"),
        })
    }

    async fn send(
        &self,
        _target: &str,
        _content_type: &str,
        bytes: Bytes,
        progress: ProgressFn,
    ) -> Result<(), UploadError> {
        let total = bytes.len() as u64;
        progress(total * 4 / 5, total); // 80%
        progress(total * 2 / 5, total); // stale 40% arriving late
        self.release.notified().await;
        progress(total, total);
        Ok(())
    }
}

/// Wait until some record satisfies the predicate, or fail the test.
async fn wait_for(
    pipeline: &Pipeline,
    mut predicate: impl FnMut(&[pixlift::types::ImageRecord]) -> bool,
) {
    let mut receiver = pipeline.subscribe();
    timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&receiver.borrow_and_update()) {
                return;
            }
            receiver.changed().await.unwrap();
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn full_round_trip_finalizes_all_records() {
    let pipeline = Pipeline::new(test_config(), Arc::new(OkTransport));
    let files = vec![jpeg_file("a.jpg"), jpeg_file("b.jpg"), jpeg_file("c.jpg")];

    let report = pipeline.ingest(files).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.finalized.len(), 3);

    let snapshot = pipeline.snapshot();
    let mut addresses: Vec<&str> = snapshot.iter().map(|r| r.display_address.as_str()).collect();
    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), 3);

    for record in &snapshot {
        assert_eq!(record.phase, Phase::Finalized);
        assert_eq!(record.progress, 100);
        assert_eq!(
            record.uploaded_address.as_deref(),
            Some(record.display_address.as_str())
        );
    }

    let stats = pipeline.preview_stats();
    assert_eq!(stats.created, stats.revoked);
    assert_eq!(stats.live, 0);
}

#[tokio::test]
async fn capacity_is_enforced_across_selections() {
    let pipeline = Pipeline::new(test_config(), Arc::new(OkTransport));

    let first: Vec<SelectedFile> = (0..8).map(|i| jpeg_file(&format!("a{i}.jpg"))).collect();
    pipeline.select(first).unwrap();

    let second: Vec<SelectedFile> = (0..3).map(|i| jpeg_file(&format!("b{i}.jpg"))).collect();
    assert!(pipeline.select(second).is_err());
    assert_eq!(pipeline.snapshot().len(), 8);

    let third: Vec<SelectedFile> = (0..2).map(|i| jpeg_file(&format!("c{i}.jpg"))).collect();
    pipeline.select(third).unwrap();
    assert_eq!(pipeline.snapshot().len(), 10);
}

#[tokio::test]
async fn progress_never_decreases_while_uploading() {
    let release = Arc::new(Notify::new());
    let pipeline = Arc::new(Pipeline::new(
        test_config(),
        Arc::new(HangingTransport {
            release: release.clone(),
        }),
    ));

    let ids = pipeline.select(vec![jpeg_file("a.jpg")]).unwrap();
    let runner = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(&ids).await })
    };

    // The 80% event lands first; the stale 40% that follows must not
    // drag the percentage back down
    wait_for(&pipeline, |records| {
        records
            .first()
            .is_some_and(|r| r.phase == Phase::Uploading && r.progress == 80)
    })
    .await;
    assert_eq!(pipeline.snapshot()[0].progress, 80);

    release.notify_one();
    let report = runner.await.unwrap();
    assert_eq!(report.finalized.len(), 1);
    assert_eq!(pipeline.snapshot()[0].progress, 100);
}

#[tokio::test]
async fn removal_mid_upload_discards_the_late_completion() {
    let release = Arc::new(Notify::new());
    let pipeline = Arc::new(Pipeline::new(
        test_config(),
        Arc::new(HangingTransport {
            release: release.clone(),
        }),
    ));

    let ids = pipeline.select(vec![jpeg_file("a.jpg")]).unwrap();
    let id = ids[0];
    let runner = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(&ids).await })
    };

    wait_for(&pipeline, |records| {
        records.first().is_some_and(|r| r.phase == Phase::Uploading)
    })
    .await;

    // Remove while the transfer is parked inside the transport
    assert!(pipeline.remove(id));
    release.notify_one();

    let report = runner.await.unwrap();

    // The record is gone and stays gone; the late completion reported
    // nothing and resurrected nothing
    assert!(report.finalized.is_empty());
    assert!(report.failures.is_empty());
    assert!(pipeline.snapshot().is_empty());

    let stats = pipeline.preview_stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.revoked, 1);
    assert_eq!(stats.live, 0);
}

#[tokio::test]
async fn failed_upload_leaves_record_retryable() {
    struct FailingTransport;

    #[async_trait]
    impl UploadTransport for FailingTransport {
        async fn issue_target(
            &self,
            _filename: &str,
            _content_type: &str,
        ) -> Result<SignedTarget, UploadError> {
            Err(UploadError::Status(500))
        }

        async fn send(
            &self,
            _target: &str,
            _content_type: &str,
            _bytes: Bytes,
            _progress: ProgressFn,
        ) -> Result<(), UploadError> {
            unreachable!("send must not run when the target request failed")
        }
    }

    let pipeline = Pipeline::new(test_config(), Arc::new(FailingTransport));
    let report = pipeline.ingest(vec![jpeg_file("a.jpg")]).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "a.jpg");

    let record = &pipeline.snapshot()[0];
    assert_eq!(record.phase, Phase::Failed);
    assert!(!record.finalized);
    // The preview is still renderable, so the user can retry
    assert!(pipeline.resolve_preview(&record.display_address).is_some());
}

#[tokio::test]
async fn selected_file_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listing.jpg");
    std::fs::write(&path, jpeg_bytes(64, 48)).unwrap();

    let file = SelectedFile::read_from(&path).unwrap();
    assert_eq!(file.name, "listing.jpg");
    assert_eq!(file.content_type, "image/jpeg");

    let pipeline = Pipeline::new(test_config(), Arc::new(OkTransport));
    let report = pipeline.ingest(vec![file]).await.unwrap();
    assert_eq!(report.finalized.len(), 1);
}

#[tokio::test]
async fn distinct_ids_for_every_selection() {
    let pipeline = Pipeline::new(test_config(), Arc::new(OkTransport));
    let a = pipeline.select(vec![jpeg_file("a.jpg")]).unwrap();
    let b = pipeline.select(vec![jpeg_file("b.jpg")]).unwrap();

    let all: Vec<ImageId> = a.into_iter().chain(b).collect();
    assert_eq!(all.len(), 2);
    assert_ne!(all[0], all[1]);
}
