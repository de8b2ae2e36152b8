//! REST client for the auth, forum and chat-history services.
//!
//! ERROR HANDLING
//! ==============
//! Non-success responses become `ApiError::Status`, carrying the service's
//! `{"error": "..."}` message when the body has one and a per-operation
//! generic message otherwise.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::types::{
    AuthTokens, ChatMessage, Collection, Comment, CreatedPost, Credentials, ErrorBody, LikeResult, NewComment, NewPost,
    Post, SignupResponse,
};
use crate::config::Endpoints;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

/// Source of chat history for a session.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, url: &str, token: &str) -> Result<Vec<ChatMessage>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: Endpoints,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoints })
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // =========================================================================
    // AUTH
    // =========================================================================

    /// `POST {auth}/signup`.
    ///
    /// # Errors
    ///
    /// Returns the service's error message, or "Registration failed".
    pub async fn signup(&self, credentials: &Credentials) -> Result<SignupResponse, ApiError> {
        let url = format!("{}/signup", self.endpoints.auth);
        read_json(self.http.post(url).json(credentials), "Registration failed").await
    }

    /// `POST {auth}/signin`.
    ///
    /// # Errors
    ///
    /// Returns the service's error message, or "Login failed".
    pub async fn signin(&self, username: &str, password: &str) -> Result<AuthTokens, ApiError> {
        let url = format!("{}/signin", self.endpoints.auth);
        let credentials = Credentials { username: username.to_owned(), password: password.to_owned(), role: None };
        read_json(self.http.post(url).json(&credentials), "Login failed").await
    }

    // =========================================================================
    // POSTS
    // =========================================================================

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        let url = format!("{}/posts", self.endpoints.forum);
        let posts: Collection<Post> = read_json(self.http.get(url), "Failed to fetch posts").await?;
        Ok(posts.into_vec())
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn get_post(&self, id: i64) -> Result<Post, ApiError> {
        let url = format!("{}/posts/{id}", self.endpoints.forum);
        read_json(self.http.get(url), "Failed to fetch post").await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn create_post(&self, token: &str, post: &NewPost) -> Result<Post, ApiError> {
        let url = format!("{}/posts", self.endpoints.forum);
        let created: CreatedPost =
            read_json(self.http.post(url).bearer_auth(token).json(post), "Failed to create post").await?;
        Ok(created.post)
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn update_post(&self, token: &str, id: i64, post: &NewPost) -> Result<(), ApiError> {
        let url = format!("{}/posts/{id}", self.endpoints.forum);
        expect_success(self.http.put(url).bearer_auth(token).json(post), "Failed to update post").await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn delete_post(&self, token: &str, id: i64) -> Result<(), ApiError> {
        let url = format!("{}/posts/{id}", self.endpoints.forum);
        expect_success(self.http.delete(url).bearer_auth(token), "Failed to delete post").await
    }

    // =========================================================================
    // COMMENTS
    // =========================================================================

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, ApiError> {
        let url = format!("{}/posts/{post_id}/comments", self.endpoints.forum);
        let comments: Collection<Comment> = read_json(self.http.get(url), "Failed to load comments").await?;
        Ok(comments.into_vec())
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn create_comment(&self, token: &str, post_id: i64, comment: &NewComment) -> Result<Comment, ApiError> {
        let url = format!("{}/posts/{post_id}/comments", self.endpoints.forum);
        read_json(self.http.post(url).bearer_auth(token).json(comment), "Failed to create comment").await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn delete_comment(&self, token: &str, id: i64) -> Result<(), ApiError> {
        let url = format!("{}/comments/{id}", self.endpoints.forum);
        expect_success(self.http.delete(url).bearer_auth(token), "Failed to delete comment").await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn like_comment(&self, token: &str, id: i64) -> Result<LikeResult, ApiError> {
        let url = format!("{}/comments/{id}/like", self.endpoints.forum);
        read_json(self.http.post(url).bearer_auth(token), "Failed to like comment").await
    }
}

#[async_trait::async_trait]
impl HistorySource for ApiClient {
    async fn fetch_history(&self, url: &str, token: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let history: Collection<ChatMessage> =
            read_json(self.http.get(url).bearer_auth(token), "Failed to fetch chat history").await?;
        Ok(history.into_vec())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_checked(request: RequestBuilder, fallback: &str) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), message: error_message(&body, fallback) })
}

async fn read_json<T: DeserializeOwned>(request: RequestBuilder, fallback: &str) -> Result<T, ApiError> {
    let body = send_checked(request, fallback).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn expect_success(request: RequestBuilder, fallback: &str) -> Result<(), ApiError> {
    send_checked(request, fallback).await.map(|_| ())
}

/// Prefer the service's `error` field; fall back to the operation's message.
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
