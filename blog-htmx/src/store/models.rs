//! Row types for authors and posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Blog author, keyed by email
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Author {
    /// Primary key
    pub id: i64,
    /// Display name
    pub name: String,
    /// Unique email address
    pub email: String,
    /// When the author first logged in
    pub created_at: DateTime<Utc>,
}

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Post {
    /// Primary key
    pub id: i64,
    /// Owning author
    pub author_id: Option<i64>,
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Publication time
    pub published_at: Option<DateTime<Utc>>,
}

/// Post joined with its author
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct PostWithAuthor {
    /// Primary key
    pub id: i64,
    /// Owning author
    pub author_id: Option<i64>,
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Publication time
    pub published_at: Option<DateTime<Utc>>,
    /// Author display name
    pub author_name: Option<String>,
    /// Author email
    pub author_email: Option<String>,
}

impl PostWithAuthor {
    /// Author name, or a placeholder for orphaned posts
    #[must_use]
    pub fn byline(&self) -> &str {
        self.author_name.as_deref().unwrap_or("anonymous")
    }
}

/// Fields for a new post
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPost {
    /// Title
    pub title: String,
    /// Body text
    #[serde(default)]
    pub body: String,
    /// Owning author
    #[serde(default)]
    pub author_id: Option<i64>,
    /// Publish immediately
    #[serde(default)]
    pub publish: bool,
}

impl NewPost {
    /// Reject posts without a title
    ///
    /// # Errors
    ///
    /// Returns a message describing the invalid field
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

/// Partial update of a post, absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostUpdate {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New body
    #[serde(default)]
    pub body: Option<String>,
    /// Publish now when `true`, unpublish when `false`
    #[serde(default)]
    pub publish: Option<bool>,
}

impl PostUpdate {
    /// Reject an explicitly empty title
    ///
    /// # Errors
    ///
    /// Returns a message describing the invalid field
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}
