//! Bounded-concurrency thumbnail streaming.
//!
//! A fixed pool of workers drains one shared FIFO of jobs ordered by
//! distance from the point centroid, so at most `concurrency` fetches are in
//! flight and central content resolves first. Per-point failures degrade to
//! placeholders and never abort the batch; only a setup error does.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use artmap_core::types::{LoadedThumb, PointSet, ThumbHandle, PRIMARY_THUMB_SIZE, THUMB_SIZES};
use image::RgbaImage;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::placeholder::placeholder_thumb;
use crate::source::{ImageSource, SourceResult};

/// Catastrophic pipeline failures; per-point fetch failures never surface
/// here.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("streaming setup failed: {message}")]
    Setup { message: String },
}

impl StreamError {
    fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}

/// Tuning knobs for one streaming batch.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Maximum simultaneous fetches.
    pub concurrency: usize,
    /// Retries after the first failed attempt of any fetch.
    pub retries: u32,
    /// First retry delay; doubles per further retry.
    pub retry_base: Duration,
    /// Pixel sizes to load; the first is the primary size.
    pub sizes: Vec<u32>,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retries: 3,
            retry_base: Duration::from_millis(200),
            sizes: THUMB_SIZES.to_vec(),
        }
    }
}

/// One unit of work: load all sizes for one point.
#[derive(Debug, Clone)]
pub struct ThumbJob {
    pub index: usize,
    pub filename: String,
}

impl ThumbJob {
    /// Jobs for every point of the set, ordered by squared distance from the
    /// centroid ascending.
    pub fn for_points(points: &PointSet) -> Vec<ThumbJob> {
        points
            .indices_by_centroid_distance()
            .into_iter()
            .filter_map(|index| {
                points.get(index).map(|p| ThumbJob {
                    index,
                    filename: p.filename.clone(),
                })
            })
            .collect()
    }
}

/// Cumulative progress of a running batch, shared with the host for status
/// display.
#[derive(Debug)]
pub struct StreamProgress {
    total: usize,
    loaded: AtomicUsize,
    started: Instant,
}

impl StreamProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            loaded: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    fn record_point_done(&self) {
        self.loaded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Points per second so far.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed_seconds();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.loaded() as f64 / elapsed
    }

    pub fn status_line(&self) -> String {
        format!(
            "loaded {}/{} thumbnails ({:.1}/s)",
            self.loaded(),
            self.total,
            self.throughput()
        )
    }
}

/// One point whose primary thumbnail could not be fetched at all.
#[derive(Debug, Clone)]
pub struct ThumbFailure {
    pub filename: String,
    pub error: String,
}

/// Batch summary returned on completion.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Points whose primary thumbnail genuinely loaded (no placeholder).
    pub success: usize,
    pub total: usize,
    pub duration_seconds: f64,
    pub errors: Vec<ThumbFailure>,
}

/// Everything a finished batch produced. `thumbs` is handed back to the
/// interaction thread, which applies it to the point set synchronously.
#[derive(Debug)]
pub struct StreamOutcome {
    pub thumbs: Vec<LoadedThumb>,
    pub report: LoadReport,
}

#[derive(Debug, Default)]
struct WorkerOutput {
    thumbs: Vec<LoadedThumb>,
    errors: Vec<ThumbFailure>,
    success: usize,
}

/// Load thumbnails for every job under the batch parameters.
///
/// Every job ends with a non-null primary handle: a real image, the
/// alternate-path image, or a synthesized placeholder. Secondary sizes are
/// best effort; unset slots are hydrated from the primary when the results
/// are applied to the point set.
pub async fn stream_thumbnails<S: ImageSource>(
    source: Arc<S>,
    jobs: Vec<ThumbJob>,
    params: StreamParams,
    progress: Arc<StreamProgress>,
) -> Result<StreamOutcome, StreamError> {
    if params.concurrency == 0 {
        return Err(StreamError::setup("worker count must be at least 1"));
    }
    if params.sizes.is_empty() || params.sizes[0] != PRIMARY_THUMB_SIZE {
        return Err(StreamError::setup(format!(
            "size list must start with the primary size {PRIMARY_THUMB_SIZE}"
        )));
    }

    let total = jobs.len();
    let started = Instant::now();
    let queue = Arc::new(Mutex::new(jobs.into_iter().collect::<VecDeque<_>>()));
    let workers = params.concurrency.min(total.max(1));

    let mut pool = JoinSet::new();
    for _ in 0..workers {
        let source = Arc::clone(&source);
        let queue = Arc::clone(&queue);
        let progress = Arc::clone(&progress);
        let params = params.clone();
        pool.spawn(async move { run_worker(source, queue, params, progress).await });
    }

    let mut thumbs = Vec::new();
    let mut errors = Vec::new();
    let mut success = 0;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(output) => {
                thumbs.extend(output.thumbs);
                errors.extend(output.errors);
                success += output.success;
            }
            Err(err) => {
                // A panicked worker loses its slice of the batch; the rest
                // of the pool keeps draining the queue.
                log::error!("streaming worker aborted: {err}");
            }
        }
    }

    let report = LoadReport {
        success,
        total,
        duration_seconds: started.elapsed().as_secs_f64(),
        errors,
    };
    log::info!(
        "thumbnail batch done: {}/{} loaded in {:.2}s ({} placeholder{})",
        report.success,
        report.total,
        report.duration_seconds,
        report.errors.len(),
        if report.errors.len() == 1 { "" } else { "s" }
    );
    Ok(StreamOutcome { thumbs, report })
}

async fn run_worker<S: ImageSource>(
    source: Arc<S>,
    queue: Arc<Mutex<VecDeque<ThumbJob>>>,
    params: StreamParams,
    progress: Arc<StreamProgress>,
) -> WorkerOutput {
    let mut out = WorkerOutput::default();
    loop {
        let job = queue.lock().pop_front();
        let Some(job) = job else { break };

        let primary = params.sizes[0];
        match fetch_decoded(&*source, primary, &job.filename, &params).await {
            Ok(image) => {
                out.thumbs.push(LoadedThumb {
                    index: job.index,
                    size: primary,
                    handle: ThumbHandle::new(image),
                });
                out.success += 1;
            }
            Err(primary_err) => {
                log::warn!(
                    "primary thumbnail exhausted for {}: {primary_err}; trying alternate path",
                    job.filename
                );
                match fetch_alternate_decoded(&*source, primary, &job.filename).await {
                    Ok(image) => {
                        out.thumbs.push(LoadedThumb {
                            index: job.index,
                            size: primary,
                            handle: ThumbHandle::new(image),
                        });
                        out.success += 1;
                    }
                    Err(alt_err) => {
                        log::warn!(
                            "alternate path failed for {}: {alt_err}; substituting placeholder",
                            job.filename
                        );
                        out.errors.push(ThumbFailure {
                            filename: job.filename.clone(),
                            error: primary_err.to_string(),
                        });
                        out.thumbs.push(LoadedThumb {
                            index: job.index,
                            size: primary,
                            handle: placeholder_thumb(&job.filename, primary),
                        });
                    }
                }
            }
        }

        for &size in params.sizes.iter().skip(1) {
            match fetch_decoded(&*source, size, &job.filename, &params).await {
                Ok(image) => out.thumbs.push(LoadedThumb {
                    index: job.index,
                    size,
                    handle: ThumbHandle::new(image),
                }),
                Err(err) => {
                    // Slot stays unset; hydrated from the primary on apply.
                    log::debug!("secondary {size}px failed for {}: {err}", job.filename);
                }
            }
        }

        progress.record_point_done();
    }
    out
}

/// One fetch with the batch's retry policy: up to `retries` further attempts
/// after a failure, delayed `retry_base * 2^(attempt-1)`, each attempt
/// carrying a fresh cache-busting token.
async fn fetch_decoded<S: ImageSource>(
    source: &S,
    size: u32,
    filename: &str,
    params: &StreamParams,
) -> SourceResult<RgbaImage> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = source.fetch(size, filename, attempt).await;
        match result.and_then(|bytes| decode_bytes(&bytes)) {
            Ok(image) => return Ok(image),
            Err(err) if attempt <= params.retries => {
                let delay = params.retry_base * 2u32.saturating_pow(attempt - 1);
                log::debug!(
                    "attempt {attempt} for {filename}@{size}px failed: {err}; retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_alternate_decoded<S: ImageSource>(
    source: &S,
    size: u32,
    filename: &str,
) -> SourceResult<RgbaImage> {
    let bytes = source.fetch_alternate(size, filename).await?;
    decode_bytes(&bytes)
}

fn decode_bytes(bytes: &[u8]) -> SourceResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use artmap_core::types::Point;

    fn jobs(n: usize) -> Vec<ThumbJob> {
        (0..n)
            .map(|i| ThumbJob {
                index: i,
                filename: format!("img{i}.jpg"),
            })
            .collect()
    }

    fn populated_source(n: usize) -> MemorySource {
        let mut source = MemorySource::new();
        for i in 0..n {
            source.insert_solid(format!("img{i}.jpg"), 8, [i as u8, 0, 0, 255]);
        }
        source
    }

    fn quick_params(concurrency: usize) -> StreamParams {
        StreamParams {
            concurrency,
            retries: 1,
            retry_base: Duration::from_millis(1),
            sizes: vec![PRIMARY_THUMB_SIZE],
        }
    }

    #[tokio::test]
    async fn test_failures_become_placeholders_and_success_counts_real_loads() {
        let n = 12;
        let mut source = populated_source(n);
        for i in [2, 5, 9] {
            source.fail_always(format!("img{i}.jpg"));
        }

        let progress = Arc::new(StreamProgress::new(n));
        let outcome = stream_thumbnails(
            Arc::new(source),
            jobs(n),
            quick_params(3),
            Arc::clone(&progress),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.success, n - 3);
        assert_eq!(outcome.report.total, n);
        assert_eq!(outcome.report.errors.len(), 3);
        assert_eq!(progress.loaded(), n);

        // Every point still got a primary handle; the failed ones are
        // placeholders.
        let primaries: Vec<_> = outcome
            .thumbs
            .iter()
            .filter(|t| t.size == PRIMARY_THUMB_SIZE)
            .collect();
        assert_eq!(primaries.len(), n);
        let placeholders = primaries.iter().filter(|t| t.handle.is_placeholder()).count();
        assert_eq!(placeholders, 3);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_count() {
        let n = 20;
        let source =
            Arc::new(populated_source(n).with_delay(Duration::from_millis(10)));

        let progress = Arc::new(StreamProgress::new(n));
        let outcome = stream_thumbnails(
            Arc::clone(&source),
            jobs(n),
            quick_params(4),
            progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.success, n);
        assert!(source.peak_in_flight() <= 4, "peak was {}", source.peak_in_flight());
        assert!(source.peak_in_flight() >= 2, "pool never overlapped");
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_retries() {
        let mut source = populated_source(1);
        source.fail_first("img0.jpg", 2);

        let params = StreamParams {
            retries: 3,
            retry_base: Duration::from_millis(1),
            sizes: vec![PRIMARY_THUMB_SIZE],
            ..Default::default()
        };
        let outcome = stream_thumbnails(
            Arc::new(source),
            jobs(1),
            params,
            Arc::new(StreamProgress::new(1)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.success, 1);
        assert!(outcome.report.errors.is_empty());
        assert!(!outcome.thumbs[0].handle.is_placeholder());
    }

    #[tokio::test]
    async fn test_alternate_path_rescues_primary_exhaustion() {
        let mut source = populated_source(1);
        source.fail_primary("img0.jpg");

        let outcome = stream_thumbnails(
            Arc::new(source),
            jobs(1),
            quick_params(1),
            Arc::new(StreamProgress::new(1)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.success, 1);
        assert!(outcome.report.errors.is_empty());
        assert!(!outcome.thumbs[0].handle.is_placeholder());
    }

    #[tokio::test]
    async fn test_secondary_sizes_are_best_effort() {
        let source = populated_source(2);
        let params = StreamParams {
            concurrency: 2,
            retries: 0,
            retry_base: Duration::from_millis(1),
            sizes: THUMB_SIZES.to_vec(),
        };
        let outcome = stream_thumbnails(
            Arc::new(source),
            jobs(2),
            params,
            Arc::new(StreamProgress::new(2)),
        )
        .await
        .unwrap();

        // All sizes served for both points.
        assert_eq!(outcome.thumbs.len(), 2 * THUMB_SIZES.len());

        // Applying to a point set hydrates and keeps generation discipline.
        let mut set = PointSet::new();
        let generation = set.replace(vec![
            Point::new("img0.jpg".into(), "a".into(), 0.0, 0.0),
            Point::new("img1.jpg".into(), "a".into(), 1.0, 1.0),
        ]);
        assert!(set.apply_thumbs(generation, outcome.thumbs));
        for index in 0..2 {
            for size in THUMB_SIZES {
                assert!(set.get(index).unwrap().thumb(size).is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_a_setup_error() {
        let result = stream_thumbnails(
            Arc::new(populated_source(1)),
            jobs(1),
            quick_params(0),
            Arc::new(StreamProgress::new(1)),
        )
        .await;
        assert!(matches!(result, Err(StreamError::Setup { .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let outcome = stream_thumbnails(
            Arc::new(MemorySource::new()),
            Vec::new(),
            quick_params(4),
            Arc::new(StreamProgress::new(0)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.report.total, 0);
        assert_eq!(outcome.report.success, 0);
    }

    #[test]
    fn test_jobs_follow_centroid_priority() {
        let mut set = PointSet::new();
        set.replace(vec![
            Point::new("far.jpg".into(), "a".into(), 100.0, 100.0),
            Point::new("center.jpg".into(), "a".into(), 34.0, 34.0),
            Point::new("near.jpg".into(), "a".into(), 2.0, 2.0),
        ]);
        let jobs = ThumbJob::for_points(&set);
        assert_eq!(jobs[0].filename, "center.jpg");
        assert_eq!(jobs.last().unwrap().filename, "far.jpg");
    }
}
