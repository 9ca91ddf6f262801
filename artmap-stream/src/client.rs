//! Typed client for the run service endpoints.

use artmap_core::run::{ApiErrorBody, ArtistInfo, ParamDef, RunConfig, RunPoint, RunRequest, RunResponse};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors surfaced to the host as status messages; no view state is mutated
/// on any of these, so the user can simply retry.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client for the DR run service and its companion query endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// Submit a run; the subset size is clamped before it leaves the client.
    pub async fn run(&self, request: &RunRequest) -> ClientResult<RunResponse> {
        let request = request.clone().sanitized();
        let url = format!("{}/api/run", self.base_url);
        let response = self.http.post(&url).json(&request).send().await?;
        Self::decode(response).await
    }

    /// Prior run configurations for a method, newest first.
    pub async fn configs(&self, method: &str) -> ClientResult<Vec<RunConfig>> {
        self.get(format!(
            "{}/api/configs/{}",
            self.base_url,
            urlencoding::encode(method)
        ))
        .await
    }

    /// Stored points of one prior run, in insertion order.
    pub async fn config_points(&self, method: &str, config_id: i64) -> ClientResult<Vec<RunPoint>> {
        self.get(format!(
            "{}/api/configs/{}/{}/points",
            self.base_url,
            urlencoding::encode(method),
            config_id
        ))
        .await
    }

    /// All artists with their side-panel metadata.
    pub async fn artists(&self) -> ClientResult<Vec<ArtistInfo>> {
        self.get(format!("{}/api/artists", self.base_url)).await
    }

    /// Names of the available DR methods.
    pub async fn methods(&self) -> ClientResult<Vec<String>> {
        self.get(format!("{}/api/methods", self.base_url)).await
    }

    /// Names of the available subset sampling strategies.
    pub async fn subset_strategies(&self) -> ClientResult<Vec<String>> {
        self.get(format!("{}/api/subset-strategies", self.base_url))
            .await
    }

    /// Published parameter schema for one method.
    pub async fn param_defs(&self, method: &str) -> ClientResult<Vec<ParamDef>> {
        self.get(format!(
            "{}/api/params/{}",
            self.base_url,
            urlencoding::encode(method)
        ))
        .await
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> ClientResult<T> {
        let response = self.http.get(&url).send().await?;
        Self::decode(response).await
    }

    /// Decode a success body, or turn a non-success status into a
    /// `ClientError::Status` carrying the service's error message when the
    /// body holds one.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}
