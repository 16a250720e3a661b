/// Remote feed gateway
///
/// The engine depends only on this contract. [`http::HttpFeedGateway`] is the
/// production implementation; tests substitute mocks.
use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::transport::ContentRequest;
use crate::models::{Category, Post};

pub mod http;

pub use http::HttpFeedGateway;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedGateway: Send + Sync {
    /// Full snapshot of the feed, already normalized
    async fn list_posts(&self) -> GatewayResult<Vec<Post>>;

    /// Create a post and return its server-assigned id
    async fn create_post(&self, request: ContentRequest) -> GatewayResult<String>;

    async fn update_post(&self, post_id: &str, request: ContentRequest) -> GatewayResult<()>;

    async fn delete_post(&self, post_id: &str) -> GatewayResult<()>;

    async fn list_categories(&self) -> GatewayResult<Vec<Category>>;
}
