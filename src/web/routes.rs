use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::crawler::{list_posts, post_detail};
use crate::temporal::TimeNormalizer;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/velog/posts", get(api_posts))
        .route("/api/v1/velog/post-detail", post(api_post_detail))
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct PostsParams {
    username: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

async fn api_posts(State(state): State<AppState>, Query(params): Query<PostsParams>) -> Response {
    let Some(username) = params
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "Missing username");
    };
    let username = username.trim_start_matches('@');
    let page = params.page.unwrap_or(1);
    if page < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Invalid page");
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid limit");
    }

    let normalizer = TimeNormalizer::new(Utc::now(), state.source_offset);
    match list_posts(&state.crawler, &normalizer, username, page, limit).await {
        Ok(Some(items)) => Json(json!({ "status": "success", "data": items })).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => {
            tracing::error!(username = %username, "Failed to list posts: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "CRAWLING_FAILED")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostDetailRequest {
    #[serde(default)]
    url: Option<String>,
}

async fn api_post_detail(
    State(state): State<AppState>,
    Json(request): Json<PostDetailRequest>,
) -> Response {
    let Some(url) = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "Missing URL");
    };

    let normalizer = TimeNormalizer::new(Utc::now(), state.source_offset);
    match post_detail(&state.crawler, &normalizer, url).await {
        Ok(Some(detail)) => Json(json!({
            "status": "success",
            "title": detail.title,
            "createdAt": detail.created_at,
            "content": detail.content,
        }))
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => {
            tracing::error!(url = %url, "Failed to fetch post detail: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "CRAWLING_FAILED")
        }
    }
}
