//! Remote Document Store
//!
//! The network side of the sync layer. `RemoteStore` is the trait seam the
//! repository drives; `HttpRemoteStore` talks to a document store over
//! `GET/PUT/DELETE {base}/records/{id}` with an optional bearer token.
//! Failures come back classified so retry profiles can sort them.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::constants::{network, sync as sync_constants};
use crate::types::{
    Classifier, Failure, LoomError, ProfileRecord, Result, UserId, truncate_chars,
};

const SOURCE: &str = "remote-store";

/// Remote persistence boundary for profile records
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the remote copy; `None` when the store has no record
    async fn fetch(&self, id: &UserId) -> Result<Option<ProfileRecord>>;

    /// Write the record, replacing any previous remote copy
    async fn store(&self, id: &UserId, record: &ProfileRecord) -> Result<()>;

    /// Remove the record; removing an absent record is not an error
    async fn remove(&self, id: &UserId) -> Result<()>;
}

/// Shared remote handle for concurrent use across sync tasks.
pub type SharedRemote = Arc<dyn RemoteStore + Send + Sync>;

/// Document-store client with secure token handling
pub struct HttpRemoteStore {
    /// Never exposed in logs or debug output
    token: Option<SecretString>,
    base_url: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpRemoteStore {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(LoomError::Config(
                "sync endpoint not set. Set PLANLOOM_SYNC__ENDPOINT or sync.endpoint in config"
                    .to_string(),
            ));
        }
        let base_url = Url::parse(&config.endpoint)
            .map_err(|e| LoomError::Config(format!("invalid sync endpoint: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| LoomError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            token: config.token.clone().map(SecretString::from),
            base_url,
            client,
        })
    }

    fn record_url(&self, id: &UserId) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            sync_constants::RECORDS_PATH,
            id
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }
        builder
    }
}

/// Turn a non-success response into a classified failure, keeping any
/// Retry-After guidance the server sent.
async fn classify_response(response: reqwest::Response) -> Failure {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(Classifier::parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    let mut failure = Classifier::from_http_status(
        status.as_u16(),
        &format!(
            "remote store returned {}: {}",
            status,
            truncate_chars(&body, network::ERROR_BODY_SNIPPET_CHARS)
        ),
        SOURCE,
    );
    if let Some(delay) = retry_after {
        failure = failure.retry_after(delay);
    }
    failure
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, id: &UserId) -> Result<Option<ProfileRecord>> {
        let url = self.record_url(id);
        debug!(user_id = %id, "fetching remote record");

        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(classify_response(response).await.into());
        }

        let record = response
            .json::<ProfileRecord>()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;
        Ok(Some(record))
    }

    async fn store(&self, id: &UserId, record: &ProfileRecord) -> Result<()> {
        let url = self.record_url(id);
        debug!(user_id = %id, "storing remote record");

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(record)
            .send()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;

        if !response.status().is_success() {
            return Err(classify_response(response).await.into());
        }
        Ok(())
    }

    async fn remove(&self, id: &UserId) -> Result<()> {
        let url = self.record_url(id);
        debug!(user_id = %id, "removing remote record");

        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(classify_response(response).await.into());
        }
        Ok(())
    }
}
