//! Blog post domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use omahring_core::{PostId, UserId};

/// A blog post. `body` is markdown.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub body: String,
    pub cover_image: Option<String>,
    pub is_published: bool,
    pub author_id: Option<UserId>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post fields accepted from the back office.
#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}
