//! Render-ready projection of the feed
//!
//! Renderers consume [`PostView`]s and never look at identity themselves:
//! control visibility is resolved here through [`Identity::can_modify`].

use serde::Serialize;

use crate::identity::Identity;
use crate::models::Post;

pub const NO_COMMENTS_NOTICE: &str =
    "No comments, Login or register and be the first to comment now!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub id: String,
    pub body: String,
    pub byline: String,
    pub comment_lines: Vec<String>,
    /// Set when the post has no comments, whether the server sent none or null
    pub empty_notice: Option<&'static str>,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl PostView {
    pub fn new(post: &Post, identity: &Identity) -> Self {
        let can_modify = identity.can_modify(post);
        let comment_lines: Vec<String> = post
            .comments
            .iter()
            .map(|c| format!("@{}: {}", c.author_username, c.body))
            .collect();

        Self {
            id: post.id.clone(),
            body: post.body.clone(),
            byline: format!("By: {}", post.author_username),
            empty_notice: comment_lines.is_empty().then_some(NO_COMMENTS_NOTICE),
            comment_lines,
            can_edit: can_modify,
            can_delete: can_modify,
        }
    }

    /// Plain-text rendering, one line per element
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![self.body.clone(), self.byline.clone(), "Comments:".to_string()];
        match self.empty_notice {
            Some(notice) => lines.push(notice.to_string()),
            None => lines.extend(self.comment_lines.iter().cloned()),
        }
        if self.can_edit {
            lines.push("[Edit] [Delete]".to_string());
        }
        lines
    }
}

/// The whole feed as it should be displayed for `identity`.
pub fn render_feed(posts: &[Post], identity: &Identity) -> Vec<PostView> {
    posts.iter().map(|p| PostView::new(p, identity)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Session;
    use crate::models::Comment;

    fn post(id: &str, author: &str, comments: Vec<Comment>) -> Post {
        Post {
            id: id.into(),
            author_id: "u".into(),
            author_username: author.into(),
            body: "body".into(),
            category_id: "c1".into(),
            comments,
        }
    }

    #[test]
    fn test_controls_follow_ownership() {
        let identity = Identity::logged_in(Session::new("u1", "alice").unwrap());
        let views = render_feed(
            &[post("p1", "alice", vec![]), post("p2", "bob", vec![])],
            &identity,
        );

        assert!(views[0].can_edit && views[0].can_delete);
        assert!(!views[1].can_edit && !views[1].can_delete);
    }

    #[test]
    fn test_anonymous_sees_no_controls() {
        let views = render_feed(&[post("p1", "alice", vec![])], &Identity::anonymous());
        assert!(!views[0].can_edit);
        assert!(!views[0].to_lines().iter().any(|l| l.contains("[Edit]")));
    }

    #[test]
    fn test_comment_lines_and_empty_notice() {
        let with = PostView::new(
            &post(
                "p1",
                "alice",
                vec![Comment {
                    author_username: "bob".into(),
                    body: "nice".into(),
                }],
            ),
            &Identity::anonymous(),
        );
        assert_eq!(with.comment_lines, vec!["@bob: nice".to_string()]);
        assert_eq!(with.empty_notice, None);

        let without = PostView::new(&post("p2", "alice", vec![]), &Identity::anonymous());
        assert_eq!(without.empty_notice, Some(NO_COMMENTS_NOTICE));
        assert_eq!(
            without.to_lines(),
            vec!["body", "By: alice", "Comments:", NO_COMMENTS_NOTICE]
        );
    }
}
