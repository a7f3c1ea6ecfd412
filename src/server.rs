//! HTTP API server.
//!
//! Serves the indexed content over a JSON API: a public surface for reading
//! posts and leaving comments, and an admin surface for reconciliation,
//! moderation and site metadata. Admin routes carry no authentication here;
//! deployments are expected to front them with a reverse proxy.
//!
//! # Public endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | App name and version |
//! | `GET`  | `/api/posts` | Visible posts, paginated (`page`, `size`, `category`, `search`) |
//! | `GET`  | `/api/posts/{id}` | One visible post; counts the view |
//! | `GET`  | `/api/posts/slug/{slug}` | Same, addressed by slug |
//! | `GET`  | `/api/posts/{id}/comments` | Comment tree, top level paginated |
//! | `GET`  | `/api/categories` | Categories with visible post counts |
//! | `GET`  | `/api/categories/{category}/posts` | Visible posts in one category |
//! | `GET`  | `/api/platform` | Site metadata |
//! | `POST` | `/api/comments` | Submit a comment or reply |
//! | `GET`  | `/api/comments/{id}/replies` | Replies under one comment |
//!
//! # Admin endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/admin/sync` | Reconcile the content directory into the index |
//! | `GET`  | `/api/admin/posts` | All posts incl. hidden (`hidden` filter) |
//! | `GET/PUT/DELETE` | `/api/admin/posts/{id}` | Inspect, edit metadata, delete |
//! | `PUT`  | `/api/admin/posts/{id}/hide` · `/show` | Visibility toggles |
//! | `GET`  | `/api/admin/comments` | All comments (`hidden`, `post_id` filters) |
//! | `PUT`  | `/api/admin/comments/{id}/hide` · `/show` | Moderation toggles |
//! | `DELETE` | `/api/admin/comments/{id}` | Delete a comment subtree |
//! | `GET`  | `/api/admin/stats` | Index statistics |
//! | `PUT`  | `/api/admin/platform` | Update site metadata |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "post not found: 7" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `sync_running` (409), `invalid_input` (422), `scan_failed` (500),
//! `apply_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the browser frontend is
//! served from a different origin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::comments::{self, CreateOutcome, NewComment};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::Platform;
use crate::platform::{self, PlatformUpdate};
use crate::posts::{self, PostDetail, PostMetaUpdate};
use crate::stats;
use crate::sync::{self, SyncError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    /// Single-writer guard: at most one reconciliation in flight.
    sync_guard: Arc<Mutex<()>>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Startup runs the full lifecycle first: the content root directory is
/// created if missing, the schema is migrated, and the platform row is
/// seeded from `[site]`. The server then runs until the process stops.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    std::fs::create_dir_all(&config.content.root)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    platform::ensure_platform(&pool, &config.site).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        sync_guard: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    println!("flog listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/api/posts", get(handle_list_posts))
        .route("/api/posts/slug/{slug}", get(handle_get_post_by_slug))
        .route("/api/posts/{id}", get(handle_get_post))
        .route("/api/posts/{id}/comments", get(handle_post_comments))
        .route("/api/categories", get(handle_list_categories))
        .route("/api/categories/{category}/posts", get(handle_category_posts))
        .route("/api/platform", get(handle_get_platform))
        .route("/api/comments", post(handle_create_comment))
        .route("/api/comments/{id}/replies", get(handle_comment_replies))
        .route("/api/admin/sync", post(handle_admin_sync))
        .route("/api/admin/posts", get(handle_admin_list_posts))
        .route(
            "/api/admin/posts/{id}",
            get(handle_admin_get_post)
                .put(handle_admin_update_post)
                .delete(handle_admin_delete_post),
        )
        .route("/api/admin/posts/{id}/hide", put(handle_admin_hide_post))
        .route("/api/admin/posts/{id}/show", put(handle_admin_show_post))
        .route("/api/admin/comments", get(handle_admin_list_comments))
        .route("/api/admin/comments/{id}", delete(handle_admin_delete_comment))
        .route(
            "/api/admin/comments/{id}/hide",
            put(handle_admin_hide_comment),
        )
        .route(
            "/api/admin/comments/{id}/show",
            put(handle_admin_show_comment),
        )
        .route("/api/admin/stats", get(handle_admin_stats))
        .route("/api/admin/platform", put(handle_admin_update_platform))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: code.to_string(),
        message: message.into(),
    }
}

fn invalid_input(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "invalid_input".to_string(),
        message: message.into(),
    }
}

/// 500 with the detail logged server-side rather than leaked to clients.
fn internal(err: anyhow::Error) -> AppError {
    tracing::error!("request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "internal error".to_string(),
    }
}

// ============ Query parameters ============

fn default_page() -> i64 {
    1
}
fn default_size() -> i64 {
    10
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
}

#[derive(Deserialize)]
struct PostListQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    category: Option<String>,
    search: Option<String>,
}

#[derive(Deserialize)]
struct AdminPostQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    hidden: Option<bool>,
}

#[derive(Deserialize)]
struct AdminCommentQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    hidden: Option<bool>,
    post_id: Option<i64>,
}

// ============ Public handlers ============

#[derive(Serialize)]
struct AppInfo {
    name: String,
    version: String,
}

async fn handle_root() -> Json<AppInfo> {
    Json(AppInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = posts::list_public(
        &state.pool,
        query.page,
        query.size,
        query.category.as_deref(),
        query.search.as_deref(),
    )
    .await
    .map_err(internal)?;
    Ok(Json(page))
}

/// Fetch a visible post and count the view. Hidden posts 404 here; they
/// exist only for the admin surface.
async fn visible_post_or_404(state: &AppState, detail: Option<PostDetail>) -> Result<PostDetail, AppError> {
    let mut detail = match detail {
        Some(detail) if !detail.is_hidden => detail,
        _ => return Err(not_found("post not found")),
    };
    posts::increment_view_count(&state.pool, detail.id)
        .await
        .map_err(internal)?;
    detail.view_count += 1;
    Ok(detail)
}

async fn handle_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = posts::get_by_id(&state.pool, id).await.map_err(internal)?;
    Ok(Json(visible_post_or_404(&state, detail).await?))
}

async fn handle_get_post_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = posts::get_by_slug(&state.pool, &slug)
        .await
        .map_err(internal)?;
    Ok(Json(visible_post_or_404(&state, detail).await?))
}

async fn handle_post_comments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let post = posts::get_by_id(&state.pool, id).await.map_err(internal)?;
    match post {
        Some(post) if !post.is_hidden => {}
        _ => return Err(not_found("post not found")),
    }
    let page = comments::thread_for_post(&state.pool, id, query.page, query.size)
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

async fn handle_list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let categories = posts::list_categories(&state.pool).await.map_err(internal)?;
    Ok(Json(categories))
}

async fn handle_category_posts(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = posts::list_public(&state.pool, query.page, query.size, Some(&category), None)
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

#[derive(Serialize)]
struct PlatformResponse {
    title: String,
    description: String,
    footer: String,
}

impl From<Platform> for PlatformResponse {
    fn from(p: Platform) -> Self {
        Self {
            title: p.title,
            description: p.description,
            footer: p.footer,
        }
    }
}

async fn handle_get_platform(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let platform = platform::get_platform(&state.pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("platform not configured"))?;
    Ok(Json(PlatformResponse::from(platform)))
}

#[derive(Serialize)]
struct CreatedComment {
    id: i64,
}

async fn handle_create_comment(
    State(state): State<AppState>,
    Json(input): Json<NewComment>,
) -> Result<impl IntoResponse, AppError> {
    if input.content.trim().is_empty() {
        return Err(invalid_input("content must not be empty"));
    }
    if input.author_name.trim().is_empty() {
        return Err(invalid_input("author_name must not be empty"));
    }

    match comments::create(&state.pool, &input).await.map_err(internal)? {
        CreateOutcome::Created(id) => Ok((StatusCode::CREATED, Json(CreatedComment { id }))),
        CreateOutcome::PostNotFound => Err(not_found("post not found")),
        CreateOutcome::InvalidParent => Err(invalid_input(
            "parent_id must reference a visible comment on the same post",
        )),
    }
}

async fn handle_comment_replies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let replies = comments::replies_for_comment(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("comment not found"))?;
    Ok(Json(replies))
}

// ============ Admin handlers ============

/// Map a failed reconciliation onto the error contract. The code tells
/// callers which stage broke; a second concurrent call gets a 409 instead
/// of queueing.
fn sync_error_response(err: SyncError) -> AppError {
    let code = match err {
        SyncError::AlreadyRunning => return conflict("sync_running", err.to_string()),
        SyncError::Scan(_) => "scan_failed",
        SyncError::Apply(_) => "apply_failed",
    };
    tracing::error!("sync failed: {}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: code.to_string(),
        message: err.to_string(),
    }
}

async fn handle_admin_sync(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = sync::run_sync(&state.config, &state.pool, &state.sync_guard)
        .await
        .map_err(sync_error_response)?;
    Ok(Json(summary))
}

async fn handle_admin_list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminPostQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = posts::list_admin(&state.pool, query.page, query.size, query.hidden)
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

async fn handle_admin_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = posts::get_by_id(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("post not found: {}", id)))?;
    Ok(Json(detail))
}

async fn handle_admin_update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<PostMetaUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let found = posts::update_meta(&state.pool, id, &changes)
        .await
        .map_err(|err| {
            // Slug collisions surface as constraint failures.
            if format!("{:#}", err).contains("UNIQUE constraint failed") {
                conflict("conflict", "slug already in use")
            } else {
                internal(err)
            }
        })?;
    if !found {
        return Err(not_found(format!("post not found: {}", id)));
    }
    let detail = posts::get_by_id(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("post not found: {}", id)))?;
    Ok(Json(detail))
}

async fn set_post_hidden(state: &AppState, id: i64, hidden: bool) -> Result<PostDetail, AppError> {
    let found = posts::set_hidden(&state.pool, id, hidden)
        .await
        .map_err(internal)?;
    if !found {
        return Err(not_found(format!("post not found: {}", id)));
    }
    posts::get_by_id(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("post not found: {}", id)))
}

async fn handle_admin_hide_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(set_post_hidden(&state, id, true).await?))
}

async fn handle_admin_show_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(set_post_hidden(&state, id, false).await?))
}

#[derive(Serialize)]
struct Deleted {
    deleted: bool,
}

async fn handle_admin_delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let found = posts::delete(&state.pool, id).await.map_err(internal)?;
    if !found {
        return Err(not_found(format!("post not found: {}", id)));
    }
    Ok(Json(Deleted { deleted: true }))
}

async fn handle_admin_list_comments(
    State(state): State<AppState>,
    Query(query): Query<AdminCommentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = comments::list_admin(
        &state.pool,
        query.page,
        query.size,
        query.hidden,
        query.post_id,
    )
    .await
    .map_err(internal)?;
    Ok(Json(page))
}

#[derive(Serialize)]
struct ModerationResult {
    id: i64,
    is_hidden: bool,
}

async fn set_comment_hidden(
    state: &AppState,
    id: i64,
    hidden: bool,
) -> Result<Json<ModerationResult>, AppError> {
    let found = comments::set_hidden(&state.pool, id, hidden)
        .await
        .map_err(internal)?;
    if !found {
        return Err(not_found(format!("comment not found: {}", id)));
    }
    Ok(Json(ModerationResult {
        id,
        is_hidden: hidden,
    }))
}

async fn handle_admin_hide_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_comment_hidden(&state, id, true).await
}

async fn handle_admin_show_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_comment_hidden(&state, id, false).await
}

async fn handle_admin_delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let found = comments::delete(&state.pool, id).await.map_err(internal)?;
    if !found {
        return Err(not_found(format!("comment not found: {}", id)));
    }
    Ok(Json(Deleted { deleted: true }))
}

async fn handle_admin_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = stats::gather(&state.pool).await.map_err(internal)?;
    Ok(Json(report))
}

async fn handle_admin_update_platform(
    State(state): State<AppState>,
    Json(changes): Json<PlatformUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let platform = platform::update_platform(&state.pool, &changes)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("platform not configured"))?;
    Ok(Json(PlatformResponse::from(platform)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = not_found("post not found: 7").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "not_found");
        assert_eq!(body["error"]["message"], "post not found: 7");
    }

    #[tokio::test]
    async fn test_invalid_input_is_422() {
        let response = invalid_input("content must not be empty").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    #[test]
    fn test_sync_errors_map_to_stage_codes() {
        let busy = sync_error_response(SyncError::AlreadyRunning);
        assert_eq!(busy.status, StatusCode::CONFLICT);
        assert_eq!(busy.code, "sync_running");

        let scan = sync_error_response(SyncError::Scan(anyhow::anyhow!("walk failed")));
        assert_eq!(scan.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(scan.code, "scan_failed");
        assert!(scan.message.contains("walk failed"));

        let apply = sync_error_response(SyncError::Apply(anyhow::anyhow!("tx aborted")));
        assert_eq!(apply.code, "apply_failed");
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = internal(anyhow::anyhow!("db path /secret/flog.db unwritable"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("/secret"));
    }
}
