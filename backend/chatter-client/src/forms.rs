//! Create, edit and delete forms
//!
//! Forms hold user input and visibility only. They turn a confirmed action
//! into an engine call and close themselves on success; the engine never
//! knows whether a form is open.

use tracing::{debug, warn};

use crate::engine::FeedEngine;
use crate::error::{FeedError, Result};
use crate::gateway::FeedGateway;
use crate::identity::Identity;
use crate::models::{Category, Post, PostDraft};

/// Category id to display name mapping, fetched once per create form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryLookup {
    categories: Vec<Category>,
}

impl CategoryLookup {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Fetch categories; a failure yields an empty lookup.
    pub async fn load(gateway: &dyn FeedGateway) -> Self {
        match gateway.list_categories().await {
            Ok(categories) => {
                debug!(count = categories.len(), "Categories loaded");
                Self::new(categories)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load categories");
                Self::default()
            }
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn name(&self, category_id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name.as_str())
    }

    pub fn contains(&self, category_id: &str) -> bool {
        self.categories.iter().any(|c| c.id == category_id)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CreateForm {
    body: String,
    selected_category: Option<String>,
    categories: CategoryLookup,
    open: bool,
}

impl CreateForm {
    /// Open the form; only logged-in users get one.
    pub fn open(identity: &Identity, categories: CategoryLookup) -> Result<Self> {
        if !identity.can_create() {
            return Err(FeedError::Unauthorized(
                "log in to create a post".to_string(),
            ));
        }
        Ok(Self {
            body: String::new(),
            selected_category: None,
            categories,
            open: true,
        })
    }

    /// Open the form and fetch its categories through the engine's gateway.
    pub async fn open_loaded(identity: &Identity, engine: &FeedEngine) -> Result<Self> {
        let gateway = engine.gateway();
        let categories = CategoryLookup::load(gateway.as_ref()).await;
        Self::open(identity, categories)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn categories(&self) -> &CategoryLookup {
        &self.categories
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.selected_category.as_deref()
    }

    pub fn select_category(&mut self, category_id: &str) -> Result<()> {
        if !self.categories.contains(category_id) {
            return Err(FeedError::Validation(format!(
                "unknown category {}",
                category_id
            )));
        }
        self.selected_category = Some(category_id.to_string());
        Ok(())
    }

    /// Create the post. Input is cleared and the form closed only on success.
    pub async fn submit(&mut self, engine: &FeedEngine, identity: &Identity) -> Result<Post> {
        if !self.open {
            return Err(FeedError::Validation("create form is closed".to_string()));
        }

        let draft = PostDraft::new(
            self.body.clone(),
            self.selected_category.clone().unwrap_or_default(),
        );
        let post = engine.apply_create(identity, draft).await?;

        self.body.clear();
        self.open = false;
        Ok(post)
    }

    pub fn cancel(&mut self) {
        self.open = false;
    }
}

#[derive(Debug, Clone)]
pub struct EditForm {
    target: Post,
    body: String,
    open: bool,
}

impl EditForm {
    /// Open pre-populated with the post's current body.
    pub fn open(identity: &Identity, post: &Post) -> Result<Self> {
        if !identity.can_modify(post) {
            return Err(FeedError::Unauthorized(format!(
                "cannot modify post {}",
                post.id
            )));
        }
        Ok(Self {
            target: post.clone(),
            body: post.body.clone(),
            open: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn target(&self) -> &Post {
        &self.target
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub async fn confirm(&mut self, engine: &FeedEngine, identity: &Identity) -> Result<()> {
        if !self.open {
            return Err(FeedError::Validation("edit form is closed".to_string()));
        }

        let updated = Post {
            body: self.body.clone(),
            ..self.target.clone()
        };
        engine.submit_update(identity, updated).await?;

        self.open = false;
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.open = false;
    }
}

#[derive(Debug, Clone)]
pub struct DeleteForm {
    target_id: String,
    open: bool,
}

impl DeleteForm {
    pub fn open(identity: &Identity, post: &Post) -> Result<Self> {
        if !identity.can_modify(post) {
            return Err(FeedError::Unauthorized(format!(
                "cannot modify post {}",
                post.id
            )));
        }
        Ok(Self {
            target_id: post.id.clone(),
            open: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub async fn confirm(&mut self, engine: &FeedEngine, identity: &Identity) -> Result<()> {
        if !self.open {
            return Err(FeedError::Validation("delete form is closed".to_string()));
        }

        engine.submit_delete(identity, &self.target_id).await?;

        self.open = false;
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.open = false;
    }
}
