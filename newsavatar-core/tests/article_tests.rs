//! Integration tests for the article-fetch client
//!
//! A throwaway axum server stands in for the news API so status mapping and
//! token forwarding are exercised over real HTTP.

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use newsavatar_core::article::TOKEN_VERIFICATION_FAILED;
use newsavatar_core::*;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;

async fn article_handler(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let id = params.get("id").cloned().unwrap_or_default();

    match (auth.as_str(), id.as_str()) {
        ("Bearer good", "missing") => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Article not found."})),
        ),
        ("Bearer good", _) => (
            StatusCode::OK,
            Json(json!({
                "message": "Fetched article by id successfully.",
                "article": {"_id": id, "title": "Rates held steady", "avatar": "Sofia"}
            })),
        ),
        ("Bearer forged", _) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": TOKEN_VERIFICATION_FAILED})),
        ),
        ("Bearer crash", _) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "database unavailable"})),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Not authenticated."})),
        ),
    }
}

async fn start_news_api() -> SocketAddr {
    let app = Router::new().route("/news/article", get(article_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_fetch_article_forwards_token() {
    let addr = start_news_api().await;
    let client = ArticleClient::new(format!("http://{}", addr));

    let article = client.fetch("abc", Some("good")).await.unwrap();
    assert_eq!(article.id.as_deref(), Some("abc"));
    assert_eq!(article.title, "Rates held steady");
    assert_eq!(article.avatar, Avatar::Sofia);
}

#[tokio::test]
async fn test_fetch_article_status_mapping() {
    let addr = start_news_api().await;
    let client = ArticleClient::new(format!("http://{}/", addr));

    let err = client.fetch("abc", Some("expired")).await.unwrap_err();
    assert!(matches!(err, NewsAvatarError::Unauthenticated { .. }));
    assert!(err.requires_login());

    let err = client.fetch("abc", Some("forged")).await.unwrap_err();
    assert!(matches!(err, NewsAvatarError::Unauthenticated { .. }));

    let err = client.fetch("missing", Some("good")).await.unwrap_err();
    assert!(matches!(err, NewsAvatarError::ArticleNotFound { .. }));

    let err = client.fetch("abc", Some("crash")).await.unwrap_err();
    assert!(matches!(err, NewsAvatarError::Server { status: 500, .. }));
    assert!(!err.requires_login());
}

#[tokio::test]
async fn test_unreachable_api_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ArticleClient::new(format!("http://{}", addr));
    let err = client.fetch("abc", Some("good")).await.unwrap_err();
    assert!(err.is_transient());
}
