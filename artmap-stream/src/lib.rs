//! Artmap Streaming Library
//!
//! HTTP endpoint client for the run service, image sources for thumbnail
//! delivery, and the bounded-concurrency streaming pipeline that loads one
//! thumbnail per point with retry, fallback, and placeholder substitution.

pub mod client;
pub mod pipeline;
pub mod placeholder;
pub mod source;

pub use client::{ApiClient, ClientError};
pub use pipeline::{
    stream_thumbnails, LoadReport, StreamError, StreamOutcome, StreamParams, StreamProgress,
    ThumbFailure, ThumbJob,
};
pub use placeholder::placeholder_thumb;
pub use source::{HttpImageSource, ImageSource, MemorySource, SourceError};
