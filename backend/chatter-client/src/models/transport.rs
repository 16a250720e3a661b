//! Wire shapes of the contents API and their normalization
//!
//! The API is loose about nested references: an author or category may come
//! back populated (`{ _id, username }`) or as a bare id, and a post's comment
//! list may be missing, `null` or empty. Everything is folded into the
//! canonical [`Post`]/[`Comment`] shapes here so the engine never sees the
//! variance.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use super::{Category, Comment, Post};

/// `GET /api/contents/` success body
#[derive(Debug, Clone, Deserialize)]
pub struct ListContentResponse {
    pub content: Vec<WirePost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePost {
    #[serde(rename = "_id")]
    pub id: String,
    pub userinput: String,
    #[serde(rename = "userId", default)]
    pub author: Option<WireRef>,
    #[serde(rename = "commentId", default)]
    pub comments: Option<Vec<WireComment>>,
    #[serde(rename = "categoryId", default)]
    pub category: Option<WireCategoryRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireComment {
    #[serde(rename = "userId", default)]
    pub author: Option<WireRef>,
    #[serde(default)]
    pub comments: String,
}

/// A user reference: populated sub-document or bare id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireRef {
    Populated {
        #[serde(rename = "_id", default)]
        id: Option<String>,
        #[serde(default)]
        username: String,
    },
    Id(String),
}

impl WireRef {
    fn into_parts(self) -> (String, String) {
        match self {
            WireRef::Populated { id, username } => (id.unwrap_or_default(), username),
            WireRef::Id(id) => (id, String::new()),
        }
    }
}

/// A category reference: populated sub-document or bare id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCategoryRef {
    Populated {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default)]
        categoryname: String,
    },
    Id(String),
}

impl WireCategoryRef {
    fn into_id(self) -> String {
        match self {
            WireCategoryRef::Populated { id, .. } | WireCategoryRef::Id(id) => id,
        }
    }
}

/// `POST /api/contents/createcontent` and `PUT /api/contents/{id}` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRequest {
    pub userinput: String,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
}

/// Create success body; only the assigned id is read
#[derive(Debug, Clone, Deserialize)]
pub struct CreateContentResponse {
    #[serde(rename = "_id")]
    pub id: String,
}

/// `GET /api/categories` success body
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<WireCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCategory {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub categoryname: String,
}

/// Failure body shared by every endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}

impl From<WireComment> for Comment {
    fn from(wire: WireComment) -> Self {
        let (_, author_username) = wire.author.map(WireRef::into_parts).unwrap_or_default();
        Comment {
            author_username,
            body: wire.comments,
        }
    }
}

impl From<WirePost> for Post {
    fn from(wire: WirePost) -> Self {
        let (author_id, author_username) =
            wire.author.map(WireRef::into_parts).unwrap_or_default();
        Post {
            id: wire.id,
            author_id,
            author_username,
            body: wire.userinput,
            category_id: wire.category.map(WireCategoryRef::into_id).unwrap_or_default(),
            comments: wire
                .comments
                .unwrap_or_default()
                .into_iter()
                .map(Comment::from)
                .collect(),
        }
    }
}

impl From<WireCategory> for Category {
    fn from(wire: WireCategory) -> Self {
        Category {
            id: wire.id,
            name: wire.categoryname,
        }
    }
}

/// Normalize a list response into a feed snapshot.
///
/// Ids must be unique within the feed; a repeated id keeps its first
/// occurrence.
pub fn normalize_snapshot(response: ListContentResponse) -> Vec<Post> {
    let mut seen = HashSet::with_capacity(response.content.len());
    let mut posts = Vec::with_capacity(response.content.len());

    for wire in response.content {
        if !seen.insert(wire.id.clone()) {
            warn!(post_id = %wire.id, "Dropping duplicate post in snapshot");
            continue;
        }
        posts.push(Post::from(wire));
    }

    posts
}
