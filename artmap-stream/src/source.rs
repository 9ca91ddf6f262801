//! Image sources: where thumbnail and detail bytes come from.
//!
//! The pipeline only talks to the [`ImageSource`] trait so tests can swap
//! the HTTP source for a deterministic in-memory one.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

/// Errors produced while fetching image bytes.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image source returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no such image: {filename}")]
    NotFound { filename: String },

    #[error("image temporarily unavailable: {filename}")]
    Unavailable { filename: String },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Provider of encoded thumbnail/detail image bytes.
///
/// `attempt` is 1-based and feeds the cache-busting query parameter, so a
/// retried request never hits an intermediate cache of the failed response.
pub trait ImageSource: Send + Sync + 'static {
    /// Thumbnail bytes at the requested pixel size, primary URL shape.
    fn fetch(
        &self,
        size: u32,
        filename: &str,
        attempt: u32,
    ) -> impl Future<Output = SourceResult<Vec<u8>>> + Send;

    /// One alternate URL shape, tried after the primary shape is exhausted.
    fn fetch_alternate(
        &self,
        size: u32,
        filename: &str,
    ) -> impl Future<Output = SourceResult<Vec<u8>>> + Send;

    /// Full/resized detail image bytes for the detail view.
    fn fetch_detail(&self, filename: &str) -> impl Future<Output = SourceResult<Vec<u8>>> + Send;
}

/// Cache-busting token: millisecond wall clock mixed with the attempt index.
pub fn cache_bust(attempt: u32) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{millis}-{attempt}")
}

/// HTTP image source keyed by pixel size and filename.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn thumb_url(&self, size: u32, filename: &str, attempt: u32) -> String {
        format!(
            "{}/thumbnails/{}/{}?cb={}",
            self.base_url,
            size,
            urlencoding::encode(filename),
            cache_bust(attempt)
        )
    }

    fn alternate_url(&self, size: u32, filename: &str) -> String {
        format!(
            "{}/images/resized/{}/{}?cb={}",
            self.base_url,
            size,
            urlencoding::encode(filename),
            cache_bust(1)
        )
    }

    fn detail_url(&self, filename: &str) -> String {
        format!(
            "{}/images/resized/{}?cb={}",
            self.base_url,
            urlencoding::encode(filename),
            cache_bust(1)
        )
    }

    async fn get_bytes(&self, url: String) -> SourceResult<Vec<u8>> {
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl ImageSource for HttpImageSource {
    async fn fetch(&self, size: u32, filename: &str, attempt: u32) -> SourceResult<Vec<u8>> {
        self.get_bytes(self.thumb_url(size, filename, attempt)).await
    }

    async fn fetch_alternate(&self, size: u32, filename: &str) -> SourceResult<Vec<u8>> {
        self.get_bytes(self.alternate_url(size, filename)).await
    }

    async fn fetch_detail(&self, filename: &str) -> SourceResult<Vec<u8>> {
        self.get_bytes(self.detail_url(filename)).await
    }
}

/// Deterministic in-memory source for tests and offline demos.
///
/// Stores decoded images keyed by filename, serves them re-encoded as PNG at
/// any requested size, and can be told to fail specific filenames either
/// permanently (primary and alternate) or for the first N attempts. It also
/// tracks the peak number of concurrent fetches so callers can assert the
/// pipeline's concurrency bound.
#[derive(Debug, Default)]
pub struct MemorySource {
    images: HashMap<String, RgbaImage>,
    fail_always: HashSet<String>,
    fail_primary: HashSet<String>,
    fail_first_attempts: HashMap<String, u32>,
    delay: Duration,
    in_flight: AtomicI64,
    peak_in_flight: AtomicI64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a solid-color square for `filename`.
    pub fn insert_solid(&mut self, filename: impl Into<String>, edge: u32, rgba: [u8; 4]) {
        let image = RgbaImage::from_pixel(edge, edge, image::Rgba(rgba));
        self.images.insert(filename.into(), image);
    }

    /// Fail every request for `filename`, primary and alternate alike.
    pub fn fail_always(&mut self, filename: impl Into<String>) {
        self.fail_always.insert(filename.into());
    }

    /// Fail the primary URL shape for `filename`; the alternate still serves.
    pub fn fail_primary(&mut self, filename: impl Into<String>) {
        self.fail_primary.insert(filename.into());
    }

    /// Fail the first `attempts` primary requests for `filename`, then serve.
    pub fn fail_first(&mut self, filename: impl Into<String>, attempts: u32) {
        self.fail_first_attempts.insert(filename.into(), attempts);
    }

    /// Hold every request open for `delay`, making overlap observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of fetches that were ever in flight at once.
    pub fn peak_in_flight(&self) -> i64 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn encode(&self, filename: &str) -> SourceResult<Vec<u8>> {
        let image = self
            .images
            .get(filename)
            .ok_or_else(|| SourceError::NotFound {
                filename: filename.to_string(),
            })?;
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    async fn serve(&self, filename: &str, fail: bool) -> SourceResult<Vec<u8>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = if fail {
            Err(SourceError::Unavailable {
                filename: filename.to_string(),
            })
        } else {
            self.encode(filename)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ImageSource for MemorySource {
    async fn fetch(&self, _size: u32, filename: &str, attempt: u32) -> SourceResult<Vec<u8>> {
        let fail = self.fail_always.contains(filename)
            || self.fail_primary.contains(filename)
            || self
                .fail_first_attempts
                .get(filename)
                .is_some_and(|&n| attempt <= n);
        self.serve(filename, fail).await
    }

    async fn fetch_alternate(&self, _size: u32, filename: &str) -> SourceResult<Vec<u8>> {
        let fail = self.fail_always.contains(filename);
        self.serve(filename, fail).await
    }

    async fn fetch_detail(&self, filename: &str) -> SourceResult<Vec<u8>> {
        let fail = self.fail_always.contains(filename);
        self.serve(filename, fail).await
    }
}
