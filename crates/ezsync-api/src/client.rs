// Listing / download HTTP client
//
// Wraps `reqwest::Client` with the card's URL conventions, the retry policy
// from `TransportConfig`, and listing-page parsing. The body of a download
// is handed back unread so the caller controls streaming and cancellation.

use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::listing::{DirectoryListing, IgnoreList, parse_listing};
use crate::transport::{RetryPolicy, TransportConfig};

/// HTTP client for the card's `dir` and `download` endpoints.
#[derive(Debug, Clone)]
pub struct ListingClient {
    http: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
    ignore: IgnoreList,
}

impl ListingClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig, ignore: IgnoreList) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, transport, ignore))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        transport: &TransportConfig,
        ignore: IgnoreList,
    ) -> Self {
        Self {
            http,
            timeout: transport.timeout,
            retry: transport.retry.clone(),
            ignore,
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch and parse one directory page.
    ///
    /// A page with no listing container yields zero entries with
    /// [`DirectoryListing::no_container`] set. The card serves such pages
    /// while it is still booting, and so does a captive portal, so callers
    /// that care can tell them from a genuinely empty directory.
    pub async fn list(&self, url: &Url) -> Result<DirectoryListing, Error> {
        let resp = self.get_with_retry(url, Some(self.timeout)).await?;
        let body = resp.text().await?;

        let Some(listing) = parse_listing(&body, &self.ignore) else {
            warn!(%url, "no listing block in response, treating as empty");
            return Ok(DirectoryListing::without_container());
        };
        debug!(
            %url,
            files = listing.files.len(),
            dirs = listing.dirs.len(),
            "listing parsed"
        );
        Ok(listing)
    }

    /// Start a download; the response body is left for the caller to stream.
    ///
    /// Only the request phase is retried. No total timeout is applied:
    /// callers bound each body chunk instead.
    pub async fn download(&self, url: &Url) -> Result<reqwest::Response, Error> {
        self.get_with_retry(url, None).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `download?<query>` resolved against the directory page URL.
    pub fn file_url(dir_url: &Url, query: &str) -> Result<Url, Error> {
        Ok(dir_url.join(&format!("download?{query}"))?)
    }

    /// A subdirectory href resolved against its parent page URL.
    pub fn subdir_url(dir_url: &Url, href: &str) -> Result<Url, Error> {
        Ok(dir_url.join(href)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_with_retry(
        &self,
        url: &Url,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, Error> {
        let mut retries = 0;
        loop {
            debug!("GET {}", url);

            let mut request = self.http.get(url.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let err = match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => Error::Status {
                    status: resp.status().as_u16(),
                    url: url.to_string(),
                },
                Err(e) => Error::Transport(e),
            };

            if !self.retry.should_retry(&err, retries) {
                return Err(err);
            }
            retries += 1;
            let delay = self.retry.backoff(retries);
            warn!(
                %url,
                error = %err,
                retry = retries,
                of = self.retry.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
