/// Canonical data models for the chatter feed
///
/// This module defines the shapes the engine and views work with:
/// - Post: a chatter with its nested comments
/// - Comment: a reply, identified only by its position in the post
/// - Category: read-only lookup entry used by the create form
/// - PostDraft: user input for a new post
///
/// Wire shapes live in [`transport`] and are normalized into these types at
/// the gateway boundary.
use serde::{Deserialize, Serialize};

pub mod transport;

/// A post ("chatter") as held in the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Server-assigned identifier, stable across refreshes
    pub id: String,
    pub author_id: String,
    /// Empty when the server only sent a bare author id
    pub author_username: String,
    pub body: String,
    pub category_id: String,
    /// Display order; never `None`, an absent list is normalized to empty
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn has_comments(&self) -> bool {
        !self.comments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author_username: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// User input collected by the create form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub body: String,
    pub category_id: String,
}

impl PostDraft {
    pub fn new(body: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            category_id: category_id.into(),
        }
    }

    /// Checks the preconditions a draft must meet before it is sent
    pub fn validate(&self) -> Result<(), String> {
        if self.body.trim().is_empty() {
            return Err("post body must not be empty".to_string());
        }
        if self.category_id.trim().is_empty() {
            return Err("a category must be selected".to_string());
        }
        Ok(())
    }
}
