//! Wire types for the dimensionality-reduction run service and its
//! companion queries (config history, stored points, artist lookup,
//! method/strategy/parameter listings).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Smallest accepted run subset.
pub const SUBSET_SIZE_MIN: u32 = 1;
/// Largest accepted run subset.
pub const SUBSET_SIZE_MAX: u32 = 500;

/// Clamp a requested subset size into the accepted range.
pub fn clamp_subset_size(size: u32) -> u32 {
    size.clamp(SUBSET_SIZE_MIN, SUBSET_SIZE_MAX)
}

/// A parameter value: the run service accepts booleans, numbers, and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Submission payload for one DR run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub method: String,
    pub subset_strategy: String,
    pub subset_size: u32,
    /// Overwrites an existing config row when supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<i64>,
    pub params: BTreeMap<String, ParamValue>,
}

impl RunRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            subset_strategy: "random".to_string(),
            subset_size: 250,
            config_id: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_subset(mut self, strategy: impl Into<String>, size: u32) -> Self {
        self.subset_strategy = strategy.into();
        self.subset_size = clamp_subset_size(size);
        self
    }

    pub fn with_config_id(mut self, config_id: i64) -> Self {
        self.config_id = Some(config_id);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Copy with the subset size forced into the accepted range.
    pub fn sanitized(mut self) -> Self {
        self.subset_size = clamp_subset_size(self.subset_size);
        self
    }
}

/// Metadata row describing one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub config_id: i64,
    pub method: String,
    pub subset_strategy: String,
    pub subset_size: u32,
    /// Elapsed run time in seconds.
    pub runtime: f64,
    /// Creation timestamp as recorded by the store ("YYYY-MM-DD HH:MM:SS").
    pub created_at: String,
}

impl RunConfig {
    /// Parsed creation timestamp, when the store produced a parseable one.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// One projected point as delivered by the run service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPoint {
    pub filename: String,
    pub artist: String,
    pub x: f64,
    pub y: f64,
}

impl From<RunPoint> for Point {
    fn from(p: RunPoint) -> Self {
        Point::new(p.filename, p.artist, p.x, p.y)
    }
}

/// Successful run response: the stored config plus its projected points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub config: RunConfig,
    pub points: Vec<RunPoint>,
}

/// Error payload the endpoints return instead of a result body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Artist side-panel metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub artist: String,
    pub nationality: Option<String>,
    pub years: Option<String>,
    pub bio: Option<String>,
}

/// Widget kind of one run parameter, as published by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Range { min: f64, max: f64, step: f64 },
    Select { options: Vec<String> },
    Checkbox,
}

/// One entry of a method's published parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    #[serde(rename = "value")]
    pub default: ParamValue,
}
