use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::BlogApi;
use super::types::{Comment, NewPost, Post};
use crate::media::MediaUploader;

const POSTS_PATH: &str = "/api/v1/posts/";

/// Optional list filters, mapped to the API's search/ordering/page
/// parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
}

/// One page of posts. `next`/`previous` are the server's pagination links;
/// both are None when the listing is not paginated.
#[derive(Debug, Clone, PartialEq)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub next: Option<String>,
    pub previous: Option<String>,
}

/// The server returns either a pagination envelope or, with pagination
/// disabled, a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostListResponse {
    Paginated {
        results: Vec<Post>,
        next: Option<String>,
        previous: Option<String>,
    },
    Plain(Vec<Post>),
}

impl From<PostListResponse> for PostPage {
    fn from(response: PostListResponse) -> Self {
        match response {
            PostListResponse::Paginated {
                results,
                next,
                previous,
            } => PostPage {
                posts: results,
                next,
                previous,
            },
            PostListResponse::Plain(posts) => PostPage {
                posts,
                next: None,
                previous: None,
            },
        }
    }
}

#[derive(Deserialize)]
struct LikeResponse {
    liked: bool,
}

impl BlogApi {
    /// Lists posts, optionally filtered, ordered, and paged.
    #[tracing::instrument(skip(self, query))]
    pub async fn list_posts(&self, query: &PostQuery) -> Result<PostPage> {
        let page = query.page.map(|p| p.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(search) = query.search.as_deref() {
            params.push(("search", search));
        }
        if let Some(ordering) = query.ordering.as_deref() {
            params.push(("ordering", ordering));
        }
        if let Some(page) = page.as_deref() {
            params.push(("page", page));
        }
        let response: PostListResponse =
            self.http().get_json_with_query(POSTS_PATH, &params).await?;
        Ok(response.into())
    }

    /// Fetches a single post by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_post(&self, id: i64) -> Result<Post> {
        self.http().get_json(&format!("{}{}/", POSTS_PATH, id)).await
    }

    /// Submits a new post. Requires an authenticated session.
    #[tracing::instrument(skip(self, new_post))]
    pub async fn create_post(&self, new_post: &NewPost) -> Result<Post> {
        self.http().post_json(POSTS_PATH, new_post).await
    }

    /// Uploads a cover image to the media host first, then submits the post
    /// with the returned URL as its cover image.
    #[tracing::instrument(skip(self, uploader, new_post, bytes))]
    pub async fn create_post_with_image(
        &self,
        uploader: &dyn MediaUploader,
        new_post: NewPost,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Post> {
        let cover_image = uploader
            .upload(file_name, bytes)
            .await
            .context("Cover image upload failed")?;
        self.create_post(&NewPost {
            cover_image,
            ..new_post
        })
        .await
    }

    /// Deletes a post. Only the author may do this; the server enforces it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_post(&self, id: i64) -> Result<()> {
        self.http().delete(&format!("{}{}/", POSTS_PATH, id)).await
    }

    /// Toggles the caller's like on a post; returns the new liked state.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_like(&self, id: i64) -> Result<bool> {
        let response: LikeResponse = self
            .http()
            .post_json(&format!("{}{}/like/", POSTS_PATH, id), &json!({}))
            .await?;
        Ok(response.liked)
    }

    /// Lists top-level comments on a post.
    #[tracing::instrument(skip(self))]
    pub async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.http()
            .get_json(&format!("{}{}/comments/", POSTS_PATH, post_id))
            .await
    }

    /// Adds a comment to a post, optionally replying to another comment.
    #[tracing::instrument(skip(self, body))]
    pub async fn add_comment(
        &self,
        post_id: i64,
        body: &str,
        parent: Option<i64>,
    ) -> Result<Comment> {
        let payload = json!({ "post": post_id, "body": body, "parent": parent });
        self.http()
            .post_json(&format!("{}{}/comments/", POSTS_PATH, post_id), &payload)
            .await
    }
}
