use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub mod reserved_domains;
pub mod retry;

pub use reserved_domains::{ReservedDomain, ReservedDomains};
pub use retry::{classify, Retry};

pub const DEFAULT_API_URL: &str = "https://api.ngrok.com";
const API_VERSION: &str = "2";

/// Error body returned by the ngrok API.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrors {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiFailure {
    #[error("ngrok api returned {status}: {} ({:?})", .errors.msg, .errors.error_code)]
    Error {
        status: StatusCode,
        errors: ApiErrors,
        retry_after: Option<Duration>,
    },
    #[error("invalid ngrok api response: {0}")]
    Invalid(#[from] reqwest::Error),
}

impl ApiFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiFailure::Error { status, .. } => Some(*status),
            ApiFailure::Invalid(err) => err.status(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

pub type ApiResponse<T> = Result<T, ApiFailure>;

pub struct Client {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Client {
    pub fn try_new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }
}

impl Client {
    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResponse<T> {
        let mut request = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Ngrok-Version", API_VERSION);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        map_api_response(response).await
    }

    async fn request_empty(&self, method: Method, path: &str) -> ApiResponse<()> {
        let response = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Ngrok-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_error(response).await)
        }
    }
}

async fn map_api_response<T: DeserializeOwned>(resp: reqwest::Response) -> ApiResponse<T> {
    let status = resp.status();
    if status.is_success() {
        let parsed: Result<T, reqwest::Error> = resp.json().await;
        match parsed {
            Ok(api_resp) => Ok(api_resp),
            Err(e) => Err(ApiFailure::Invalid(e)),
        }
    } else {
        Err(map_error(resp).await)
    }
}

async fn map_error(resp: reqwest::Response) -> ApiFailure {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let parsed: Result<ApiErrors, reqwest::Error> = resp.json().await;
    let errors = parsed.unwrap_or_default();
    tracing::debug!(%status, code = ?errors.error_code, "ngrok api request failed");
    ApiFailure::Error {
        status,
        errors,
        retry_after,
    }
}
