use common::discovery::Discoverer;
use common::error::RegistryError;
use common::model::Entry;
use common::selector;
use std::time::Duration;

/// Errors from calls to a discovered backend
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Discovery or selection failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status
    #[error("backend {url} returned {status}: {message}")]
    Backend {
        url: String,
        status: u16,
        message: String,
    },
    /// Response body was not the expected JSON
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// HTTP client for the entry API of whichever backend discovery yields.
///
/// Every call runs a fresh discovery pass and picks one live backend at
/// random, so consecutive calls may land on different instances.
#[derive(Debug, Clone)]
pub struct BackendClient {
    discoverer: Discoverer,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(discoverer: Discoverer, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { discoverer, http })
    }

    pub fn discoverer(&self) -> &Discoverer {
        &self.discoverer
    }

    /// Base URL of one live backend.
    pub async fn backend_url(&self) -> Result<String, ClientError> {
        let addresses = self.discoverer.discover().await?;
        let address = selector::select(&addresses)?;
        Ok(format!("http://{address}"))
    }

    /// Entries held by one live backend, newest first.
    pub async fn list_entries(&self) -> Result<Vec<Entry>, ClientError> {
        let url = format!("{}/entries", self.backend_url().await?);
        log::debug!("Fetching entries from {url}");
        let resp = self.http.get(&url).send().await?;
        let body = check_status(&url, resp).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Submit `text` as a new entry to one live backend.
    pub async fn create_entry(&self, text: &str) -> Result<(), ClientError> {
        let url = format!("{}/entry", self.backend_url().await?);
        log::debug!("Posting entry to {url}");
        let resp = self.http.post(&url).form(&[("text", text)]).send().await?;
        check_status(&url, resp).await?;
        Ok(())
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Backend {
        url: url.to_string(),
        status,
        message,
    })
}
