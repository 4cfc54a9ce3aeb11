//! HTTP client for the Scribe admin API.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Success envelope returned by the server.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

/// Error envelope returned by the server.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
    message: String,
    #[serde(default)]
    business_code: Option<String>,
}

/// HTTP client for the Scribe API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client pointing at `base_url`. Requests under `/api/v1` carry
    /// `token` as a bearer credential when one is set.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} failed", what))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => match err.business_code {
                Some(code) => anyhow::bail!("{} ({}, {}): {}", status, err.error, code, err.message),
                None => anyhow::bail!("{} ({}): {}", status, err.error, err.message),
            },
            Err(_) if body.is_empty() => anyhow::bail!("API error ({})", status),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    async fn data<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", what))?;

        if !api_resp.success {
            anyhow::bail!("{} reported failure", what);
        }
        api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
    }

    /// GET and unwrap the `data` field.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let what = format!("GET {}", path);
        let resp = self.send(self.request(Method::GET, path), &what).await?;
        Self::data(resp, &what).await
    }

    /// POST a JSON body and unwrap the `data` field.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let what = format!("POST {}", path);
        let resp = self
            .send(self.request(Method::POST, path).json(body), &what)
            .await?;
        Self::data(resp, &what).await
    }

    /// PUT a JSON body and unwrap the `data` field.
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let what = format!("PUT {}", path);
        let resp = self
            .send(self.request(Method::PUT, path).json(body), &what)
            .await?;
        Self::data(resp, &what).await
    }

    /// POST a JSON body to an endpoint that answers `204 No Content`.
    pub async fn post_no_content<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let what = format!("POST {}", path);
        self.send(self.request(Method::POST, path).json(body), &what)
            .await?;
        Ok(())
    }

    /// DELETE; the server answers `204 No Content`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let what = format!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path), &what).await?;
        Ok(())
    }

    /// Unauthenticated GET returning the raw JSON body (health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        // A degraded server answers 503 with the same body.
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}
