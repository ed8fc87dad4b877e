//! Isolated transcode worker.
//!
//! Each job runs on its own blocking thread (`spawn_blocking`), apart from
//! the async coordinator. The worker decodes the source once, then renders
//! every variant in parallel on the rayon pool. Each encoded variant is sent
//! over a typed channel as soon as it is ready, so uploads can start while
//! the rest are still rendering:
//!
//! ```text
//! worker thread ──decode──► rayon: render v1 │ v2 │ … vN
//!                                    │      │       │
//!                                    ▼      ▼       ▼
//!                            mpsc::Receiver<TranscodeResult>  (one per job)
//!
//! completion: Ok(N) after all N were sent, or Err on the first failure
//! ```
//!
//! The worker shares nothing mutable with the coordinator: it owns its job,
//! reads the variant list through an `Arc`, and moves each encoded buffer
//! into the channel. A decode, render or encode error, or a panic, fails the
//! whole job.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::EncodingConfig;
use crate::imaging::{BackendError, ImageBackend, render_variant};
use crate::matrix::{ImageVariantSpec, OutputFormat};
use crate::naming::{source_extension, variant_key};
use crate::walk::LocalImageFile;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: BackendError,
    },
    #[error("Failed to render {variant} ({format}): {source}")]
    Render {
        variant: String,
        format: OutputFormat,
        source: BackendError,
    },
    #[error("Worker panicked: {0}")]
    Panicked(String),
    #[error("Result receiver dropped before the worker finished")]
    Abandoned,
}

/// All variants to render for one image.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub file: LocalImageFile,
    pub variants: Arc<[ImageVariantSpec]>,
    pub encoding: EncodingConfig,
}

/// One encoded variant, ready for upload.
#[derive(Debug)]
pub struct TranscodeResult {
    /// Variant name (`"{bucket}-{variation}"`).
    pub variant: String,
    pub format: OutputFormat,
    /// Processed-bucket key.
    pub output_key: String,
    pub bytes: Vec<u8>,
}

/// Handle on a running worker.
pub struct Worker {
    /// Encoded variants, in completion order. Closes when the worker exits.
    pub results: mpsc::Receiver<TranscodeResult>,
    task: JoinHandle<Result<usize, TranscodeError>>,
}

impl Worker {
    /// Wait for the worker thread to exit. `Ok` carries the number of
    /// variants sent.
    pub async fn finish(self) -> Result<usize, TranscodeError> {
        // The receiver goes first so a worker blocked on a full channel can exit
        drop(self.results);
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TranscodeError::Panicked(panic_message(
                e.into_panic(),
            ))),
            Err(e) => Err(TranscodeError::Panicked(e.to_string())),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Start `job` on a blocking thread.
pub fn spawn<B: ImageBackend>(backend: Arc<B>, job: TranscodeJob) -> Worker {
    // Room for every variant: sends never wait on the uploader
    let (tx, rx) = mpsc::channel(job.variants.len().max(1));
    let task = tokio::task::spawn_blocking(move || transcode(backend.as_ref(), &job, &tx));
    Worker { results: rx, task }
}

/// Decode once, render every variant, send each result.
fn transcode<B: ImageBackend>(
    backend: &B,
    job: &TranscodeJob,
    tx: &mpsc::Sender<TranscodeResult>,
) -> Result<usize, TranscodeError> {
    let file = &job.file;
    let image = backend
        .decode(&file.absolute_path)
        .map_err(|source| TranscodeError::Decode {
            path: file.absolute_path.clone(),
            source,
        })?;
    let source_ext = source_extension(&file.relative_path);

    job.variants.par_iter().try_for_each(|variant| {
        let bytes = render_variant(backend, &image, variant, source_ext, &job.encoding).map_err(
            |source| TranscodeError::Render {
                variant: variant.name.clone(),
                format: variant.format,
                source,
            },
        )?;
        let output_key = variant_key(&file.relative_path, variant);
        debug!(key = %output_key, bytes = bytes.len(), "Rendered variant");
        tx.blocking_send(TranscodeResult {
            variant: variant.name.clone(),
            format: variant.format,
            output_key,
            bytes,
        })
        .map_err(|_| TranscodeError::Abandoned)
    })?;

    Ok(job.variants.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Codec;
    use crate::imaging::backend::tests::MockBackend;
    use crate::matrix::resolve_variants;
    use crate::test_helpers::{tiny_config, write_file};
    use tempfile::TempDir;

    fn job(root: &std::path::Path, rel: &str, variants: Vec<ImageVariantSpec>) -> TranscodeJob {
        TranscodeJob {
            file: LocalImageFile {
                relative_path: rel.to_string(),
                absolute_path: root.join(rel),
            },
            variants: variants.into(),
            encoding: EncodingConfig::default(),
        }
    }

    async fn collect(mut worker: Worker) -> (Vec<TranscodeResult>, Result<usize, TranscodeError>) {
        let mut results = Vec::new();
        while let Some(result) = worker.results.recv().await {
            results.push(result);
        }
        (results, worker.finish().await)
    }

    #[tokio::test]
    async fn streams_every_variant_then_succeeds() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("album/a.jpg"), b"fake");
        let config = tiny_config(
            &[("small", 100), ("large", 400)],
            &[("original", None), ("square", Some(1.0))],
            &[OutputFormat::Webp, OutputFormat::Original],
        );
        let backend = Arc::new(MockBackend::with_dimensions(800, 600));

        let worker = spawn(
            backend.clone(),
            job(tmp.path(), "album/a.jpg", resolve_variants(&config)),
        );
        let (results, completion) = collect(worker).await;

        assert_eq!(completion.unwrap(), 8);
        assert_eq!(results.len(), 8);
        let mut keys: Vec<&str> = results.iter().map(|r| r.output_key.as_str()).collect();
        keys.sort();
        assert!(keys.contains(&"album/a-small-square.webp"));
        assert!(keys.contains(&"album/a-large-original.jpg"));
        // decoded once, rendered per variant
        assert_eq!(backend.get_operations().len(), 9);
        assert_eq!(backend.render_count(), 8);
    }

    #[tokio::test]
    async fn result_bytes_follow_never_enlarge() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("tiny.png"), b"fake");
        let config = tiny_config(&[("xlarge", 1500)], &[("original", None)], &[OutputFormat::Webp]);
        let backend = Arc::new(MockBackend::with_dimensions(300, 200));

        let (results, completion) = collect(spawn(
            backend,
            job(tmp.path(), "tiny.png", resolve_variants(&config)),
        ))
        .await;
        assert!(completion.is_ok());
        assert_eq!(results[0].bytes, b"300x200.webp");
        assert_eq!(results[0].output_key, "tiny-xlarge-original.webp");
    }

    #[tokio::test]
    async fn render_failure_fails_the_job() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("c.png"), b"fake");
        let config = tiny_config(
            &[("small", 100), ("large", 400)],
            &[("original", None)],
            &[OutputFormat::Webp],
        );
        let backend = Arc::new(MockBackend::new());
        backend.fail_render(400, Codec::Webp);

        let (results, completion) = collect(spawn(
            backend,
            job(tmp.path(), "c.png", resolve_variants(&config)),
        ))
        .await;
        assert!(matches!(completion, Err(TranscodeError::Render { .. })));
        assert!(results.iter().all(|r| r.output_key != "c-large-original.webp"));
    }

    #[tokio::test]
    async fn decode_failure_sends_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = tiny_config(&[("small", 100)], &[("square", Some(1.0))], &[OutputFormat::Webp]);
        let backend = Arc::new(MockBackend::new());
        backend.fail_decode("broken.jpg");

        let (results, completion) = collect(spawn(
            backend,
            job(tmp.path(), "broken.jpg", resolve_variants(&config)),
        ))
        .await;
        assert!(results.is_empty());
        assert!(matches!(completion, Err(TranscodeError::Decode { .. })));
    }

    #[tokio::test]
    async fn panic_is_reported_as_failure() {
        let tmp = TempDir::new().unwrap();
        let config = tiny_config(&[("small", 100)], &[("square", Some(1.0))], &[OutputFormat::Webp]);
        let backend = Arc::new(MockBackend::new());
        backend.panic_on_decode("boom.jpg");

        let (_, completion) = collect(spawn(
            backend,
            job(tmp.path(), "boom.jpg", resolve_variants(&config)),
        ))
        .await;
        match completion {
            Err(TranscodeError::Panicked(msg)) => assert!(msg.contains("boom.jpg")),
            other => panic!("expected panic failure, got {other:?}"),
        }
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
