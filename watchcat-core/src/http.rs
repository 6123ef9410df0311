//! HTTP transport used by the stream sources.
//!
//! Sources only see the [`HttpClient`] trait, so their parsing and polling
//! logic can be exercised against canned responses in tests. The default
//! implementation wraps reqwest and owns the transport concerns (user agent,
//! request timeout).

use std::time::Duration;
use async_trait::async_trait;
use reqwest;
use crate::Error;

pub const DEFAULT_USER_AGENT: &str = "Watchcat stream notifier";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status code and body of a completed request. Non-2xx responses are not
/// errors at this layer; sources decide what a status means.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, Error>;
    async fn post(&self, url: &str, body: String, headers: &[(&str, &str)]) -> Result<HttpResponse, Error>;
}

#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl DefaultHttpClient {
    pub fn new(user_agent: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, Error> {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn post(&self, url: &str, body: String, headers: &[(&str, &str)]) -> Result<HttpResponse, Error> {
        let mut request = self.client.post(url).body(body);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
