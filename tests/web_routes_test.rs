//! Integration tests for the HTTP API.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::FixedOffset;
use common::{crawler, post_html, post_url, profile, profile_html, FakeRenderer};
use serde_json::Value;
use tower::ServiceExt;
use velog_activity::web::{create_app, AppState};

fn create_test_app() -> Router {
    let renderer = FakeRenderer::new()
        .with_page(&profile("alice"), profile_html("alice", &["a", "b", "c"]))
        .with_page(
            &post_url("alice", "a"),
            post_html("첫 글", "로그인 본문 A", &["java"], "2025. 8. 9 오후 11:30", &[]),
        )
        .with_page(
            &post_url("alice", "b"),
            post_html("둘째 글", "본문 B", &[], "2025. 8. 10", &[]),
        )
        .with_failure(&post_url("alice", "c"))
        .with_failure(&profile("broken"));

    let state = AppState {
        crawler: crawler(Arc::new(renderer)),
        source_offset: FixedOffset::east_opt(9 * 3600).unwrap(),
    };
    create_app(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: Router, uri: &str, body: &str) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = get(create_test_app(), "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_posts_requires_username() {
    let response = get(create_test_app(), "/api/v1/velog/posts").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "Missing username");

    let response = get(create_test_app(), "/api/v1/velog/posts?username=").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_posts_first_page() {
    let response = get(create_test_app(), "/api/v1/velog/posts?username=alice&limit=2").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["title"], "첫 글");
    assert_eq!(data[0]["url"], post_url("alice", "a"));
    assert_eq!(data[0]["date"], "2025-08-09");
    assert_eq!(data[0]["tags"][0], "java");
    assert_eq!(data[1]["date"], "2025-08-10");
}

#[tokio::test]
async fn test_posts_failed_item_fails_the_page() {
    let response = get(
        create_test_app(),
        "/api/v1/velog/posts?username=@alice&page=2&limit=2",
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["detail"], "CRAWLING_FAILED");
}

#[tokio::test]
async fn test_posts_rejects_out_of_range_paging() {
    for (query, detail) in [
        ("page=0", "Invalid page"),
        ("limit=0", "Invalid limit"),
        ("limit=500", "Invalid limit"),
    ] {
        let uri = format!("/api/v1/velog/posts?username=alice&{query}");
        let response = get(create_test_app(), &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body_json(response).await["detail"], detail);
    }

    let response = get(create_test_app(), "/api/v1/velog/posts?username=alice&page=1&limit=1").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_posts_page_past_end_is_empty() {
    let response = get(
        create_test_app(),
        "/api/v1/velog/posts?username=alice&page=9&limit=10",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_posts_unknown_user() {
    let response = get(create_test_app(), "/api/v1/velog/posts?username=ghost").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["detail"], "User not found");
}

#[tokio::test]
async fn test_posts_crawl_failure() {
    let response = get(create_test_app(), "/api/v1/velog/posts?username=broken").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["detail"], "CRAWLING_FAILED");
}

#[tokio::test]
async fn test_post_detail() {
    let body = format!(r#"{{"url": "{}"}}"#, post_url("alice", "a"));
    let response = post_json(create_test_app(), "/api/v1/velog/post-detail", &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["title"], "첫 글");
    assert_eq!(json["createdAt"], "2025-08-09");
    assert_eq!(json["content"], "본문 A");
}

#[tokio::test]
async fn test_post_detail_requires_url() {
    let response = post_json(create_test_app(), "/api/v1/velog/post-detail", "{}").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "Missing URL");
}

#[tokio::test]
async fn test_post_detail_not_found() {
    let body = format!(r#"{{"url": "{}"}}"#, post_url("alice", "missing"));
    let response = post_json(create_test_app(), "/api/v1/velog/post-detail", &body).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["detail"], "Post not found");
}

#[tokio::test]
async fn test_post_detail_crawl_failure() {
    let body = format!(r#"{{"url": "{}"}}"#, post_url("alice", "c"));
    let response = post_json(create_test_app(), "/api/v1/velog/post-detail", &body).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
