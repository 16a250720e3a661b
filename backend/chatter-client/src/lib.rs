pub mod config;
pub mod engine;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod identity;
pub mod jobs;
pub mod models;
pub mod view;

pub use config::Config;
pub use engine::{
    EngineConfig, FeedEngine, FeedEvent, FeedState, MutationOutcome, ReconcilePolicy,
    RefreshOutcome,
};
pub use error::{FailureKind, FeedError, GatewayError, Result};
pub use forms::{CategoryLookup, CreateForm, DeleteForm, EditForm};
pub use gateway::{FeedGateway, HttpFeedGateway};
pub use identity::{Identity, Session};
pub use jobs::{RefreshHandle, RefreshJob};
pub use models::{Category, Comment, Post, PostDraft};
