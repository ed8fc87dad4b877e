//! Sync coordinator.
//!
//! Drives one run end to end:
//!
//! ```text
//! 1. list originals bucket        → RemoteInventory       (fatal on error)
//! 2. walker thread ──entries──►  coordinator              (bounded channel)
//! 3. per file: classify           → unsupported / unchanged / needs processing
//! 4. needs processing             → scheduler.submit(job) (waits when full)
//! 5. per job:
//!      worker ──results──► upload each variant as it arrives
//!      worker ok + all uploads ok → upload original        (marks complete)
//!      anything else               → failed, original not written
//! 6. drain scheduler              → SyncReport
//! ```
//!
//! The coordinator is a single task. Hashing runs on the blocking pool and is
//! awaited in place, so at most one file is hashed at a time from here while
//! up to `max_jobs` jobs transcode and upload concurrently.
//!
//! Every job produces exactly one outcome: panics anywhere in a job are caught
//! and reported as failures, and an optional watchdog fails jobs that run too
//! long.
//!
//! Progress is reported through [`SyncEvent`]s on an optional
//! `std::sync::mpsc` channel; [`output`](crate::output) formats them.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{EncodingConfig, SyncConfig};
use crate::detect::{ChangeReason, Classification, classify};
use crate::imaging::ImageBackend;
use crate::inventory::fetch_inventory;
use crate::matrix::{ImageVariantSpec, resolve_variants};
use crate::report::{ImageOutcome, SyncReport};
use crate::scheduler::{BoundedScheduler, DEFAULT_LIMIT};
use crate::store::{ObjectStore, StoreError};
use crate::upload::Uploader;
use crate::walk::{LocalImageFile, WalkError, walk};
use crate::worker::{self, TranscodeError, TranscodeJob, panic_message};

/// Walker entries buffered ahead of the coordinator.
const WALK_BUFFER: usize = 256;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot build remote inventory: {0}")]
    Inventory(#[from] StoreError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("Directory walker stopped unexpectedly: {0}")]
    Walker(String),
}

/// Why a single job failed.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("Upload failed: {0}")]
    Upload(#[from] StoreError),
    #[error("Upload task failed: {0}")]
    UploadTask(String),
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Progress events sent during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    InventoryFetched {
        bucket: String,
        objects: usize,
    },
    DirectorySkipped {
        path: PathBuf,
        message: String,
    },
    Unchanged {
        path: String,
    },
    Unsupported {
        path: String,
    },
    /// Dry run only: the image would be processed.
    Planned {
        path: String,
        reason: ChangeReason,
    },
    Queued {
        path: String,
        reason: ChangeReason,
        variants: usize,
    },
    VariantUploaded {
        path: String,
        key: String,
    },
    /// All variants and the original are stored.
    Completed {
        path: String,
        variants: usize,
    },
    Failed {
        path: String,
        reason: String,
    },
}

fn emit(events: &Option<Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        // A closed printer only loses progress lines
        tx.send(event).ok();
    }
}

/// Run-level settings that do not come from the matrix document.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub originals_bucket: String,
    pub processed_bucket: String,
    pub max_jobs: usize,
    pub job_timeout: Option<Duration>,
    /// Classify only: no transcoding, no writes.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(originals_bucket: &str, processed_bucket: &str) -> Self {
        Self {
            originals_bucket: originals_bucket.to_string(),
            processed_bucket: processed_bucket.to_string(),
            max_jobs: DEFAULT_LIMIT,
            job_timeout: None,
            dry_run: false,
        }
    }

    /// Take `max_jobs` and the watchdog from the processing config.
    pub fn with_processing(mut self, config: &SyncConfig) -> Self {
        self.max_jobs = config.processing.max_jobs;
        self.job_timeout = config.processing.job_timeout_secs.map(Duration::from_secs);
        self
    }
}

pub struct Pipeline<S, B> {
    store: Arc<S>,
    backend: Arc<B>,
    variants: Arc<[ImageVariantSpec]>,
    encoding: EncodingConfig,
    options: SyncOptions,
    events: Option<Sender<SyncEvent>>,
}

impl<S: ObjectStore, B: ImageBackend> Pipeline<S, B> {
    pub fn new(store: Arc<S>, backend: Arc<B>, config: &SyncConfig, options: SyncOptions) -> Self {
        Self {
            store,
            backend,
            variants: resolve_variants(config).into(),
            encoding: config.encoding.clone(),
            options,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn variants(&self) -> &[ImageVariantSpec] {
        &self.variants
    }

    /// Sync every image under `root`.
    ///
    /// Returns `Err` only for run-level failures (inventory, unreadable
    /// root). Per-image failures are recorded in the report.
    pub async fn run(&self, root: &Path) -> Result<SyncReport, SyncError> {
        let bucket = &self.options.originals_bucket;
        let inventory = fetch_inventory(self.store.as_ref(), bucket).await?;
        emit(
            &self.events,
            SyncEvent::InventoryFetched {
                bucket: bucket.clone(),
                objects: inventory.len(),
            },
        );

        let (tx, mut entries) = mpsc::channel(WALK_BUFFER);
        let walk_root = root.to_path_buf();
        let walker = tokio::task::spawn_blocking(move || {
            for entry in walk(&walk_root) {
                if tx.blocking_send(entry).is_err() {
                    break;
                }
            }
        });

        let mut report = SyncReport::new();
        let mut scheduler = BoundedScheduler::new(self.options.max_jobs);

        while let Some(entry) = entries.recv().await {
            let file = match entry {
                Ok(file) => file,
                Err(WalkError::Unreadable { path, message }) => {
                    warn!(path = %path.display(), "Skipping unreadable directory: {message}");
                    emit(
                        &self.events,
                        SyncEvent::DirectorySkipped {
                            path: path.clone(),
                            message: message.clone(),
                        },
                    );
                    report.skip_directory(path, message);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let path = file.relative_path.clone();
            match classify(&file, self.backend.as_ref(), &inventory).await {
                Classification::Unsupported => {
                    emit(&self.events, SyncEvent::Unsupported { path: path.clone() });
                    report.record(path, ImageOutcome::Unsupported);
                }
                Classification::Unchanged => {
                    emit(&self.events, SyncEvent::Unchanged { path: path.clone() });
                    report.record(path, ImageOutcome::Unchanged);
                }
                Classification::Unreadable(reason) => {
                    warn!(path = %path, "Cannot fingerprint: {reason}");
                    emit(
                        &self.events,
                        SyncEvent::Failed {
                            path: path.clone(),
                            reason: reason.clone(),
                        },
                    );
                    report.record(path, ImageOutcome::Failed { reason });
                }
                Classification::NeedsProcessing(reason) if self.options.dry_run => {
                    emit(
                        &self.events,
                        SyncEvent::Planned {
                            path: path.clone(),
                            reason,
                        },
                    );
                    report.record(path, ImageOutcome::Planned(reason));
                }
                Classification::NeedsProcessing(reason) => {
                    emit(
                        &self.events,
                        SyncEvent::Queued {
                            path,
                            reason,
                            variants: self.variants.len(),
                        },
                    );
                    for (path, outcome) in scheduler.submit(self.job(file)).await {
                        report.record(path, outcome);
                    }
                }
            }
        }

        walker
            .await
            .map_err(|e| SyncError::Walker(e.to_string()))?;

        for (path, outcome) in scheduler.drain().await {
            report.record(path, outcome);
        }

        info!(summary = %report.counts(), "Sync finished");
        Ok(report)
    }

    /// The future for one image. Always resolves to an outcome.
    fn job(
        &self,
        file: LocalImageFile,
    ) -> impl Future<Output = (String, ImageOutcome)> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let uploader = Uploader::new(
            Arc::clone(&self.store),
            &self.options.originals_bucket,
            &self.options.processed_bucket,
        );
        let job = TranscodeJob {
            file,
            variants: Arc::clone(&self.variants),
            encoding: self.encoding.clone(),
        };
        let events = self.events.clone();
        let timeout = self.options.job_timeout;

        async move {
            let path = job.file.relative_path.clone();
            let work = AssertUnwindSafe(process_image(backend, uploader, job, events.clone()))
                .catch_unwind()
                .map(|caught| {
                    caught.unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(payload))))
                });

            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or(Err(JobError::TimedOut(limit))),
                None => work.await,
            };

            let outcome = match result {
                Ok(variants) => {
                    emit(
                        &events,
                        SyncEvent::Completed {
                            path: path.clone(),
                            variants,
                        },
                    );
                    ImageOutcome::Processed { variants }
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(path = %path, "Image failed: {reason}");
                    emit(
                        &events,
                        SyncEvent::Failed {
                            path: path.clone(),
                            reason: reason.clone(),
                        },
                    );
                    ImageOutcome::Failed { reason }
                }
            };
            (path, outcome)
        }
    }
}

/// Transcode one image, upload its variants as they stream in, then the
/// original. Returns the number of variants stored.
async fn process_image<S, B>(
    backend: Arc<B>,
    uploader: Uploader<S>,
    job: TranscodeJob,
    events: Option<Sender<SyncEvent>>,
) -> Result<usize, JobError>
where
    S: ObjectStore,
    B: ImageBackend,
{
    let file = job.file.clone();
    let mut worker = worker::spawn(backend, job);
    let mut uploads = JoinSet::new();

    while let Some(result) = worker.results.recv().await {
        let uploader = uploader.clone();
        let events = events.clone();
        let path = file.relative_path.clone();
        uploads.spawn(async move {
            let key = uploader.upload_variant(result).await?;
            emit(&events, SyncEvent::VariantUploaded { path, key });
            Ok::<_, StoreError>(())
        });
    }

    // Channel closed: the worker has exited one way or the other
    if let Err(e) = worker.finish().await {
        uploads.abort_all();
        return Err(e.into());
    }

    let mut stored = 0;
    while let Some(joined) = uploads.join_next().await {
        match joined {
            Ok(Ok(())) => stored += 1,
            Ok(Err(e)) => {
                uploads.abort_all();
                return Err(e.into());
            }
            Err(e) => {
                uploads.abort_all();
                return Err(JobError::UploadTask(e.to_string()));
            }
        }
    }

    uploader.upload_original(&file).await?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_bytes;
    use crate::imaging::Codec;
    use crate::imaging::backend::tests::MockBackend;
    use crate::matrix::OutputFormat;
    use crate::store::MemoryStore;
    use crate::test_helpers::{tiny_config, write_file};
    use tempfile::TempDir;

    const ORIGINALS: &str = "originals";
    const PROCESSED: &str = "processed";

    fn one_variant_config() -> SyncConfig {
        tiny_config(&[("small", 100)], &[("square", Some(1.0))], &[OutputFormat::Webp])
    }

    fn pipeline(
        store: &Arc<MemoryStore>,
        backend: MockBackend,
        config: &SyncConfig,
    ) -> Pipeline<MemoryStore, MockBackend> {
        Pipeline::new(
            Arc::clone(store),
            Arc::new(backend),
            config,
            SyncOptions::new(ORIGINALS, PROCESSED).with_processing(config),
        )
    }

    #[tokio::test]
    async fn new_image_processed_and_matching_image_skipped() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"image a");
        write_file(&tmp.path().join("b.jpg"), b"image b");
        let store = Arc::new(MemoryStore::new());
        store.seed(ORIGINALS, "b.jpg", b"image b");

        let report = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(tmp.path())
            .await
            .unwrap();

        assert_eq!(report.counts().processed, 1);
        assert_eq!(report.counts().unchanged, 1);
        assert_eq!(
            report.outcome("a.jpg"),
            Some(&ImageOutcome::Processed { variants: 1 })
        );
        assert_eq!(store.writes_to(PROCESSED), ["a-small-square.webp"]);
        assert_eq!(store.writes_to(ORIGINALS), ["a.jpg"]);
    }

    #[tokio::test]
    async fn original_is_written_after_every_variant() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("art/a.png"), b"png");
        let config = tiny_config(
            &[("small", 100), ("large", 400)],
            &[("original", None), ("square", Some(1.0))],
            &[OutputFormat::Webp, OutputFormat::Avif],
        );
        let store = Arc::new(MemoryStore::new());

        let report = pipeline(&store, MockBackend::new(), &config)
            .run(tmp.path())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("art/a.png"),
            Some(&ImageOutcome::Processed { variants: 8 })
        );
        let writes = store.writes();
        assert_eq!(writes.len(), 9);
        assert_eq!(
            writes.last().unwrap(),
            &(ORIGINALS.to_string(), "art/a.png".to_string())
        );
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"image a");
        write_file(&tmp.path().join("sub/c.tif"), b"image c");
        let store = Arc::new(MemoryStore::new());
        let config = one_variant_config();

        let first = pipeline(&store, MockBackend::new(), &config)
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(first.counts().processed, 2);
        let writes_after_first = store.writes().len();

        let backend = MockBackend::new();
        let second_pipeline = pipeline(&store, backend, &config);
        let second = second_pipeline.run(tmp.path()).await.unwrap();
        assert_eq!(second.counts().unchanged, 2);
        assert_eq!(second.counts().processed, 0);
        assert_eq!(store.writes().len(), writes_after_first);
        assert!(second_pipeline.backend.get_operations().is_empty());
    }

    #[tokio::test]
    async fn changed_image_is_reprocessed() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"edited");
        let store = Arc::new(MemoryStore::new());
        store.seed(ORIGINALS, "a.jpg", b"before edit");

        let report = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(report.counts().processed, 1);
        assert_eq!(
            store.get(ORIGINALS, "a.jpg").unwrap().etag,
            format!("\"{}\"", fingerprint_bytes(b"edited"))
        );
    }

    #[tokio::test]
    async fn failing_variant_blocks_original() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("c.png"), b"png");
        let config = tiny_config(
            &[("small", 100), ("large", 400)],
            &[("original", None)],
            &[OutputFormat::Webp],
        );
        let backend = MockBackend::new();
        backend.fail_render(400, Codec::Webp);
        let store = Arc::new(MemoryStore::new());

        let report = pipeline(&store, backend, &config)
            .run(tmp.path())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome("c.png"),
            Some(ImageOutcome::Failed { .. })
        ));
        assert!(report.has_failures());
        assert!(store.writes_to(ORIGINALS).is_empty());
    }

    #[tokio::test]
    async fn rejected_variant_upload_blocks_original() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"jpg");
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_to("a-small-square.webp");

        let report = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(tmp.path())
            .await
            .unwrap();

        match report.outcome("a.jpg") {
            Some(ImageOutcome::Failed { reason }) => assert!(reason.contains("Upload failed")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(store.writes_to(ORIGINALS).is_empty());
    }

    #[tokio::test]
    async fn failed_image_is_retried_next_run() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"jpg");
        let store = Arc::new(MemoryStore::new());
        let config = one_variant_config();

        let backend = MockBackend::new();
        backend.fail_decode("a.jpg");
        let first = pipeline(&store, backend, &config)
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(first.counts().failed, 1);

        let second = pipeline(&store, MockBackend::new(), &config)
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(second.counts().processed, 1);
    }

    #[tokio::test]
    async fn worker_panic_is_isolated() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("boom.jpg"), b"x");
        write_file(&tmp.path().join("fine.jpg"), b"y");
        let backend = MockBackend::new();
        backend.panic_on_decode("boom.jpg");
        let store = Arc::new(MemoryStore::new());

        let report = pipeline(&store, backend, &one_variant_config())
            .run(tmp.path())
            .await
            .unwrap();
        assert!(matches!(
            report.outcome("boom.jpg"),
            Some(ImageOutcome::Failed { .. })
        ));
        assert_eq!(
            report.outcome("fine.jpg"),
            Some(&ImageOutcome::Processed { variants: 1 })
        );
        assert_eq!(store.writes_to(ORIGINALS), ["fine.jpg"]);
    }

    #[tokio::test]
    async fn unsupported_files_are_reported_not_processed() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("notes.txt"), b"text");
        write_file(&tmp.path().join("clip.mov"), b"mov");
        let store = Arc::new(MemoryStore::new());

        let report = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(report.counts().unsupported, 2);
        assert!(!report.has_failures());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"jpg");
        let store = Arc::new(MemoryStore::new());
        store.fail_listing(ORIGINALS);

        let result = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(tmp.path())
            .await;
        assert!(matches!(result, Err(SyncError::Inventory(_))));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let result = pipeline(&store, MockBackend::new(), &one_variant_config())
            .run(&tmp.path().join("missing"))
            .await;
        assert!(matches!(result, Err(SyncError::Walk(_))));
    }

    #[tokio::test]
    async fn dry_run_plans_without_writing() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"new");
        write_file(&tmp.path().join("b.jpg"), b"same");
        let store = Arc::new(MemoryStore::new());
        store.seed(ORIGINALS, "b.jpg", b"same");
        let config = one_variant_config();
        let mut options = SyncOptions::new(ORIGINALS, PROCESSED);
        options.dry_run = true;

        let backend = Arc::new(MockBackend::new());
        let report = Pipeline::new(store.clone(), backend.clone(), &config, options)
            .run(tmp.path())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("a.jpg"),
            Some(&ImageOutcome::Planned(ChangeReason::New))
        );
        assert_eq!(report.outcome("b.jpg"), Some(&ImageOutcome::Unchanged));
        assert!(store.writes().is_empty());
        assert!(backend.get_operations().is_empty());
    }

    #[tokio::test]
    async fn watchdog_fails_slow_jobs() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("slow.jpg"), b"x");
        let store = Arc::new(MemoryStore::new());
        let config = one_variant_config();
        let mut options = SyncOptions::new(ORIGINALS, PROCESSED);
        options.job_timeout = Some(Duration::from_millis(50));
        let backend = MockBackend::new().with_decode_delay(Duration::from_millis(500));

        let report = Pipeline::new(store.clone(), Arc::new(backend), &config, options)
            .run(tmp.path())
            .await
            .unwrap();

        match report.outcome("slow.jpg") {
            Some(ImageOutcome::Failed { reason }) => assert!(reason.starts_with("Timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(store.writes_to(ORIGINALS).is_empty());
    }

    #[tokio::test]
    async fn many_images_respect_job_limit() {
        let tmp = TempDir::new().unwrap();
        for i in 0..6 {
            write_file(&tmp.path().join(format!("img{i}.jpg")), format!("{i}").as_bytes());
        }
        let store = Arc::new(MemoryStore::new());
        let mut config = one_variant_config();
        config.processing.max_jobs = 2;
        let backend = MockBackend::new().with_decode_delay(Duration::from_millis(20));

        let report = pipeline(&store, backend, &config)
            .run(tmp.path())
            .await
            .unwrap();
        assert_eq!(report.counts().processed, 6);
        assert_eq!(store.writes_to(ORIGINALS).len(), 6);
    }

    #[tokio::test]
    async fn events_follow_image_lifecycle() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.jpg"), b"a");
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = std::sync::mpsc::channel();

        pipeline(&store, MockBackend::new(), &one_variant_config())
            .with_events(tx)
            .run(tmp.path())
            .await
            .unwrap();

        let events: Vec<SyncEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SyncEvent::InventoryFetched {
                    bucket: ORIGINALS.into(),
                    objects: 0,
                },
                SyncEvent::Queued {
                    path: "a.jpg".into(),
                    reason: ChangeReason::New,
                    variants: 1,
                },
                SyncEvent::VariantUploaded {
                    path: "a.jpg".into(),
                    key: "a-small-square.webp".into(),
                },
                SyncEvent::Completed {
                    path: "a.jpg".into(),
                    variants: 1,
                },
            ]
        );
    }
}
