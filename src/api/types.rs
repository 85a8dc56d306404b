use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A published post as returned by the API.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
}

/// Payload for submitting a new post. Category and tag references are sent
/// as id lists; `cover_image` holds the media host URL, if any.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub cover_image: String,
    pub category_ids: Vec<i64>,
    pub tag_ids: Vec<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post: i64,
    pub user: Option<String>,
    pub body: String,
    pub parent: Option<i64>,
    pub created_at: String,
}
