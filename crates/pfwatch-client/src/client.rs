// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use pfwatch_domain::{Listing, ListingId, ListingPage, ListingQuery};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const PARTY_FINDER_API_BASE: &str = "https://xivpf.littlenightmare.top/api";
const USER_AGENT: &str = concat!("pfwatch/", env!("CARGO_PKG_VERSION"));

/// Read access to Party Finder listings.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page of listings in server order.
    async fn fetch_listings(&self, query: &ListingQuery) -> Result<ListingPage>;

    /// Fetch a single listing including its slot roster.
    async fn fetch_listing(&self, id: ListingId) -> Result<Listing>;
}

/// HTTP client for the Party Finder API.
#[derive(Debug, Clone)]
pub struct PartyFinderClient {
    client: Client,
    base_url: String,
}

impl PartyFinderClient {
    /// Create a new client with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder() -> PartyFinderClientBuilder {
        PartyFinderClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search listings.
    ///
    /// # Example
    /// ```no_run
    /// # use pfwatch_client::{ListingSource, PartyFinderClient};
    /// # use pfwatch_domain::{Category, ListingQuery};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = PartyFinderClient::new()?;
    /// let query = ListingQuery::new().category(Category::Raids).datacenter("Gaia");
    /// let page = client.fetch_listings(&query).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn search(&self, query: &ListingQuery) -> Result<ListingPage> {
        let mut url = self.endpoint("/listings")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query.to_query_pairs() {
                pairs.append_pair(name, &value);
            }
        }
        self.get(url).await
    }

    /// Look up a listing by id.
    pub async fn listing(&self, id: ListingId) -> Result<Listing> {
        let url = self.endpoint(&format!("/listing/{}", id))?;
        self.get(url).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        trace!(target: "client", "GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await?;

        let status = response.status();
        debug!(target: "client", %status, path = url.path(), "response received");

        if status == 404 {
            return Err(ClientError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        trace!(target: "client", "response body: {}", body);

        serde_json::from_str(&body).map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl ListingSource for PartyFinderClient {
    async fn fetch_listings(&self, query: &ListingQuery) -> Result<ListingPage> {
        self.search(query).await
    }

    async fn fetch_listing(&self, id: ListingId) -> Result<Listing> {
        self.listing(id).await
    }
}

/// Builder for configuring a Party Finder client.
#[derive(Debug)]
pub struct PartyFinderClientBuilder {
    base_url: String,
    timeout: Duration,
}

impl Default for PartyFinderClientBuilder {
    fn default() -> Self {
        Self {
            base_url: PARTY_FINDER_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl PartyFinderClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<PartyFinderClient> {
        Url::parse(&self.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(PartyFinderClient {
            client,
            base_url: self.base_url,
        })
    }
}
