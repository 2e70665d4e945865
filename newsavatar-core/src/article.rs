//! Article reference and the client for the article-fetch collaborator

use crate::avatar::Avatar;
use crate::error::{NewsAvatarError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Message the collaborator returns when token verification fails with a 500
pub const TOKEN_VERIFICATION_FAILED: &str =
    "Token verification failed. Please provide a valid token.";

/// Read-only view of a stored article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Storage ID
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Headline spoken by the avatar
    pub title: String,
    /// Presenter identity
    #[serde(default)]
    pub avatar: Avatar,
    /// Short summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Primary category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ArticleRef {
    /// Article with just a title and a presenter
    pub fn new(title: impl Into<String>, avatar: Avatar) -> Self {
        Self {
            id: None,
            title: title.into(),
            avatar,
            description: None,
            category: None,
        }
    }
}

#[derive(Deserialize)]
struct ArticleEnvelope {
    article: ArticleRef,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}

/// HTTP client for `GET /news/article`
#[derive(Debug, Clone)]
pub struct ArticleClient {
    http: reqwest::Client,
    api_url: String,
}

impl ArticleClient {
    /// Create a client for the API at `api_url`
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing `reqwest` client
    pub fn with_client(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch an article, forwarding the caller's token untouched
    pub async fn fetch(&self, article_id: &str, token: Option<&str>) -> Result<ArticleRef> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(NewsAvatarError::AccessDenied)?;

        let url = format!("{}/news/article", self.api_url);
        debug!(article_id, "fetching article");

        let response = self
            .http
            .get(&url)
            .query(&[("id", article_id)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| NewsAvatarError::transport("fetch-article", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NewsAvatarError::transport("fetch-article", &e))?;

        if !status.is_success() {
            let err = classify_failure(article_id, status, &body);
            warn!(article_id, status = status.as_u16(), "article fetch failed: {}", err);
            return Err(err);
        }

        serde_json::from_str::<ArticleEnvelope>(&body)
            .map(|envelope| envelope.article)
            .map_err(|e| NewsAvatarError::InvalidResponse {
                operation: "fetch-article".to_string(),
                reason: e.to_string(),
            })
    }
}

fn classify_failure(article_id: &str, status: StatusCode, body: &str) -> NewsAvatarError {
    let message = serde_json::from_str::<MessageBody>(body)
        .map(|b| b.message)
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED => NewsAvatarError::Unauthenticated { reason: message },
        StatusCode::NOT_FOUND => NewsAvatarError::ArticleNotFound {
            article_id: article_id.to_string(),
        },
        StatusCode::INTERNAL_SERVER_ERROR if message == TOKEN_VERIFICATION_FAILED => {
            NewsAvatarError::Unauthenticated { reason: message }
        }
        _ => NewsAvatarError::Server {
            status: status.as_u16(),
            reason: if message.is_empty() {
                "Something went wrong".to_string()
            } else {
                message
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_from_storage_json() {
        let json = r#"{
            "_id": "65a1",
            "title": "Markets rally",
            "avatar": "Sofia",
            "content": "ignored",
            "category": "business"
        }"#;
        let article: ArticleRef = serde_json::from_str(json).unwrap();
        assert_eq!(article.id.as_deref(), Some("65a1"));
        assert_eq!(article.avatar, Avatar::Sofia);
        assert_eq!(article.category.as_deref(), Some("business"));
    }

    #[test]
    fn test_article_without_avatar_uses_fallback() {
        let article: ArticleRef = serde_json::from_str(r#"{"title":"t"}"#).unwrap();
        assert_eq!(article.avatar, Avatar::Jack);
    }

    #[test]
    fn test_classify_failures() {
        assert!(matches!(
            classify_failure("1", StatusCode::UNAUTHORIZED, ""),
            NewsAvatarError::Unauthenticated { .. }
        ));
        assert!(matches!(
            classify_failure("1", StatusCode::NOT_FOUND, ""),
            NewsAvatarError::ArticleNotFound { .. }
        ));

        let token_failure = format!(r#"{{"message":"{}"}}"#, TOKEN_VERIFICATION_FAILED);
        assert!(matches!(
            classify_failure("1", StatusCode::INTERNAL_SERVER_ERROR, &token_failure),
            NewsAvatarError::Unauthenticated { .. }
        ));
        assert!(matches!(
            classify_failure("1", StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"db down"}"#),
            NewsAvatarError::Server { status: 500, .. }
        ));
        assert!(matches!(
            classify_failure("1", StatusCode::BAD_GATEWAY, "oops"),
            NewsAvatarError::Server { status: 502, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_token_is_access_denied() {
        let client = ArticleClient::new("http://127.0.0.1:9");
        let err = client.fetch("1", None).await.unwrap_err();
        assert!(matches!(err, NewsAvatarError::AccessDenied));

        let err = client.fetch("1", Some("")).await.unwrap_err();
        assert!(matches!(err, NewsAvatarError::AccessDenied));
    }
}
