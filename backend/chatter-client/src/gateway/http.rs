//! HTTP implementation of the feed gateway
//!
//! Talks JSON to the contents API. Every failure is classified into a
//! [`GatewayError`] here; nothing above this module sees a reqwest error.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{FeedGateway, GatewayResult};
use crate::config::Config;
use crate::error::GatewayError;
use crate::models::transport::{
    normalize_snapshot, ApiMessage, CategoriesResponse, ContentRequest, CreateContentResponse,
    ListContentResponse,
};
use crate::models::{Category, Post};

const CONTENTS_PATH: &str = "/api/contents";
const CATEGORIES_PATH: &str = "/api/categories";

#[derive(Debug, Clone)]
pub struct HttpFeedGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpFeedGateway {
    pub fn new(base_url: &str, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        Self::new(&config.api.base_url, config.api.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn content_url(&self, post_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            CONTENTS_PATH,
            urlencoding::encode(post_id)
        )
    }

    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else if err.is_decode() {
            GatewayError::MalformedResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }

    /// Read the body once, then either surface the `{ message }` failure or
    /// decode the success shape.
    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        fallback: &str,
    ) -> GatewayResult<T> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(api_failure(status.as_u16(), &body, fallback));
        }

        serde_json::from_slice(&body).map_err(GatewayError::from)
    }

    async fn expect_success(&self, response: Response, fallback: &str) -> GatewayResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Err(api_failure(status.as_u16(), &body, fallback))
    }
}

fn api_failure(status: u16, body: &[u8], fallback: &str) -> GatewayError {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .ok()
        .and_then(|m| m.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string());
    GatewayError::Api { status, message }
}

#[async_trait]
impl FeedGateway for HttpFeedGateway {
    async fn list_posts(&self) -> GatewayResult<Vec<Post>> {
        let url = format!("{}{}/", self.base_url, CONTENTS_PATH);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        debug!(
            status = %response.status(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "List contents response received"
        );

        let body: ListContentResponse = self.read_json(response, "Failed to fetch data").await?;
        Ok(normalize_snapshot(body))
    }

    async fn create_post(&self, request: ContentRequest) -> GatewayResult<String> {
        let url = format!("{}{}/createcontent", self.base_url, CONTENTS_PATH);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: CreateContentResponse =
            self.read_json(response, "Failed to create chatter").await?;
        if body.id.is_empty() {
            return Err(GatewayError::MalformedResponse(
                "create response carried an empty _id".to_string(),
            ));
        }

        debug!(post_id = %body.id, "Content created");
        Ok(body.id)
    }

    async fn update_post(&self, post_id: &str, request: ContentRequest) -> GatewayResult<()> {
        let response = self
            .client
            .put(self.content_url(post_id))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.expect_success(response, "Failed to update chatter").await
    }

    async fn delete_post(&self, post_id: &str) -> GatewayResult<()> {
        let response = self
            .client
            .delete(self.content_url(post_id))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.expect_success(response, "Failed to delete chatter").await
    }

    async fn list_categories(&self) -> GatewayResult<Vec<Category>> {
        let url = format!("{}{}", self.base_url, CATEGORIES_PATH);

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: CategoriesResponse =
            self.read_json(response, "Failed to fetch categories").await?;
        Ok(body.categories.into_iter().map(Category::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_creation() {
        let gateway = HttpFeedGateway::new("http://localhost:4000/", Duration::from_secs(5))
            .expect("client should build");
        assert_eq!(gateway.base_url(), "http://localhost:4000");
        assert_eq!(
            gateway.content_url("p 1"),
            "http://localhost:4000/api/contents/p%201"
        );
    }

    #[test]
    fn test_api_failure_uses_message_payload() {
        let err = api_failure(404, br#"{"message":"Content not found"}"#, "fallback");
        assert_eq!(
            err,
            GatewayError::Api {
                status: 404,
                message: "Content not found".into()
            }
        );
    }

    #[test]
    fn test_api_failure_falls_back_on_non_json() {
        let err = api_failure(502, b"<html>bad gateway</html>", "Failed to fetch data");
        assert_eq!(
            err,
            GatewayError::Api {
                status: 502,
                message: "Failed to fetch data".into()
            }
        );
    }
}
