//! Identity context and the edit/delete authorization predicate
//!
//! An [`Identity`] is either fully anonymous or carries a complete
//! [`Session`]; there is no state in between. It is passed explicitly to
//! every operation that needs to authorize the caller.

use thiserror::Error;

use crate::models::Post;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("user id must not be empty")]
    MissingUserId,
    #[error("username must not be empty")]
    MissingUsername,
}

/// Authenticated user data, always complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
    username: String,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let user_id = user_id.into();
        let username = username.into();
        if user_id.trim().is_empty() {
            return Err(IdentityError::MissingUserId);
        }
        if username.trim().is_empty() {
            return Err(IdentityError::MissingUsername);
        }
        Ok(Self { user_id, username })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// The current user as seen by the feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    session: Option<Session>,
    dropdown_open: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn logged_in(session: Session) -> Self {
        Self {
            session: Some(session),
            dropdown_open: false,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(Session::username)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::user_id)
    }

    pub fn is_dropdown_open(&self) -> bool {
        self.dropdown_open
    }

    /// Replace the session; closes the dropdown like a completed login does.
    pub fn login(&mut self, session: Session) {
        tracing::info!(username = %session.username, "User logged in");
        self.session = Some(session);
        self.dropdown_open = false;
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(username = %session.username, "User logged out");
        }
        self.dropdown_open = false;
    }

    pub fn toggle_dropdown(&mut self) {
        self.dropdown_open = !self.dropdown_open;
    }

    /// True iff the user is logged in and authored `post`.
    ///
    /// This is the only place edit/delete authorization is decided.
    pub fn can_modify(&self, post: &Post) -> bool {
        match &self.session {
            Some(session) => post.author_username == session.username,
            None => false,
        }
    }

    /// Only logged-in users may open the create form
    pub fn can_create(&self) -> bool {
        self.is_logged_in()
    }
}
