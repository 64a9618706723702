/**
 * Comment Routes
 * Depth-bounded comment CRUD and the paged two-level comment tree
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::{optional_user, require_user};
use crate::db::models::{CommentAuthor, EnrichedComment};
use crate::error::ApiError;
use crate::routes::{require_pool, resolve_post, ResolvedPost};
use crate::sanitize::sanitize_comment;
use crate::slug::is_valid_slug;

/// Maximum nesting depth: 0 = top-level, 1 and 2 are replies. A reply to a
/// comment already at depth 2 is rejected.
pub const MAX_COMMENT_DEPTH: i64 = 2;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/artbooks/:slug/comments
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// Request body for POST /api/artbooks/:slug/comments
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

/// Request body for PUT /api/artbooks/:slug/comments/:id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// One top-level comment together with its direct replies, oldest-first.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: EnrichedComment,
    pub replies: Vec<EnrichedComment>,
}

/// Pagination metadata for the comment page.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Response for GET /api/artbooks/:slug/comments
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<CommentThread>,
    pub pagination: PageInfo,
}

/// Response wrapper for create/update.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub comment: EnrichedComment,
}

/// Success response (for delete)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// ============================================================================
// Row mapping
// ============================================================================

/// Comment row joined with its author and derived counts.
#[derive(Debug, FromRow)]
struct EnrichedRow {
    id: Uuid,
    content: String,
    parent_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_id: Uuid,
    author_name: String,
    author_image: Option<String>,
    reply_count: i64,
    like_count: i64,
}

impl EnrichedRow {
    fn into_comment(self, viewer_liked: bool) -> EnrichedComment {
        EnrichedComment {
            id: self.id,
            content: self.content,
            parent_id: self.parent_id,
            author: CommentAuthor {
                id: self.author_id,
                name: self.author_name,
                image: self.author_image,
            },
            reply_count: self.reply_count,
            like_count: self.like_count,
            viewer_liked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const ENRICHED_SELECT: &str = r#"
    SELECT c.id, c.content, c.parent_id, c.created_at, c.updated_at,
           u.id AS author_id, u.name AS author_name, u.image AS author_image,
           (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id) AS reply_count,
           (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS like_count
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

// ============================================================================
// Helpers
// ============================================================================

/// Bounded parent-chain walk: counts parent hops toward the nearest
/// top-level comment, stopping once the count exceeds the depth cap. The
/// caller supplies each looked-up parent via [`DepthWalk::advance`], so the
/// walk itself is independent of where the rows come from. Cycles are
/// structurally impossible because a parent must exist before a child
/// references it.
struct DepthWalk {
    next: Option<Uuid>,
    depth: i64,
}

impl DepthWalk {
    fn new(parent_id: Option<Uuid>) -> Self {
        Self {
            next: parent_id,
            depth: 0,
        }
    }

    /// Id to look up next, or None once the walk is finished.
    fn next_lookup(&mut self) -> Option<Uuid> {
        let pid = self.next?;
        self.depth += 1;
        if self.depth > MAX_COMMENT_DEPTH {
            self.next = None;
            return None;
        }
        Some(pid)
    }

    fn advance(&mut self, parent: Option<Uuid>) {
        self.next = parent;
    }

    fn depth(&self) -> i64 {
        self.depth
    }
}

/// Number of parent hops from a comment to the nearest top-level comment.
/// A bounded loop, not recursion: at most two hops are ever walked.
async fn comment_depth(pool: &PgPool, parent_id: Option<Uuid>) -> Result<i64, ApiError> {
    let mut walk = DepthWalk::new(parent_id);
    while let Some(pid) = walk.next_lookup() {
        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT parent_id FROM comments WHERE id = $1")
                .bind(pid)
                .fetch_optional(pool)
                .await?;
        walk.advance(row.and_then(|(p,)| p));
    }
    Ok(walk.depth())
}

/// Reply admission rules: the parent must belong to the same post, and the
/// new comment sits at parent_depth + 1, which must stay within the cap.
fn check_reply_target(
    parent_post: Uuid,
    post_id: Uuid,
    parent_depth: i64,
) -> Result<(), ApiError> {
    if parent_post != post_id {
        return Err(ApiError::Conflict(
            "Parent comment belongs to a different artbook".to_string(),
        ));
    }
    if parent_depth >= MAX_COMMENT_DEPTH {
        return Err(ApiError::Conflict(
            "Maximum comment depth exceeded".to_string(),
        ));
    }
    Ok(())
}

/// Delete admission rules: author-only, and never while replies exist.
fn check_delete(author_id: Uuid, requester: Uuid, reply_count: i64) -> Result<(), ApiError> {
    if author_id != requester {
        return Err(ApiError::Forbidden(
            "Only the author can delete this comment".to_string(),
        ));
    }
    if reply_count > 0 {
        return Err(ApiError::Conflict(
            "Cannot delete a comment that has replies".to_string(),
        ));
    }
    Ok(())
}

/// Fetch one comment enriched with author, counts, and the viewer's like
/// state, verifying it belongs to the named artbook's post.
async fn fetch_enriched(
    pool: &PgPool,
    comment_id: Uuid,
    post_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<EnrichedComment, ApiError> {
    let sql = format!("{} WHERE c.id = $1 AND c.post_id = $2", ENRICHED_SELECT);
    let row: Option<EnrichedRow> = sqlx::query_as(&sql)
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await?;
    let row = row.ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    let viewer_liked = match viewer {
        Some(user_id) => {
            let liked: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM comment_likes WHERE user_id = $1 AND comment_id = $2",
            )
            .bind(user_id)
            .bind(comment_id)
            .fetch_optional(pool)
            .await?;
            liked.is_some()
        }
        None => false,
    };

    Ok(row.into_comment(viewer_liked))
}

/// Fetch a comment's ownership row, verifying it belongs to `post_id`.
async fn fetch_owned(
    pool: &PgPool,
    comment_id: Uuid,
    resolved: &ResolvedPost,
) -> Result<(Uuid, i64), ApiError> {
    let row: Option<(Uuid, Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT c.author_id, c.post_id,
               (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id)
        FROM comments c
        WHERE c.id = $1
        "#,
    )
    .bind(comment_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((author_id, post_id, reply_count)) if post_id == resolved.post_id => {
            Ok((author_id, reply_count))
        }
        Some(_) => Err(ApiError::NotFound(
            "Comment not found for this artbook".to_string(),
        )),
        None => Err(ApiError::NotFound("Comment not found".to_string())),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/artbooks/:slug/comments - One page of the two-level comment tree
///
/// Top-level comments newest-first with offset/limit pagination; direct
/// replies eagerly loaded oldest-first in a single batched query. When a
/// bearer token is present every node carries the viewer's like state.
pub async fn list_comments(
    Path(slug): Path<String>,
    Query(query): Query<CommentListQuery>,
    headers: HeaderMap,
) -> Result<Json<CommentPage>, ApiError> {
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let viewer = optional_user(&headers);
    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;

    let limit = query.limit.clamp(1, 50);
    let page = query.page.max(1);
    let offset = (page - 1) * limit;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND parent_id IS NULL",
    )
    .bind(resolved.post_id)
    .fetch_one(pool.as_ref())
    .await?;

    let sql = format!(
        "{} WHERE c.post_id = $1 AND c.parent_id IS NULL \
         ORDER BY c.created_at DESC LIMIT $2 OFFSET $3",
        ENRICHED_SELECT
    );
    let top_rows: Vec<EnrichedRow> = sqlx::query_as(&sql)
        .bind(resolved.post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool.as_ref())
        .await?;

    // One batched replies fetch for the whole page, never per-parent.
    let top_ids: Vec<Uuid> = top_rows.iter().map(|r| r.id).collect();
    let reply_rows: Vec<EnrichedRow> = if top_ids.is_empty() {
        Vec::new()
    } else {
        let sql = format!(
            "{} WHERE c.parent_id = ANY($1) ORDER BY c.created_at ASC",
            ENRICHED_SELECT
        );
        sqlx::query_as(&sql)
            .bind(&top_ids)
            .fetch_all(pool.as_ref())
            .await?
    };

    // Per-node viewer annotation, resolved in one query across the page.
    let liked_ids: HashSet<Uuid> = match viewer {
        Some(user_id) => {
            let mut all_ids = top_ids.clone();
            all_ids.extend(reply_rows.iter().map(|r| r.id));
            if all_ids.is_empty() {
                HashSet::new()
            } else {
                let rows: Vec<(Uuid,)> = sqlx::query_as(
                    "SELECT comment_id FROM comment_likes \
                     WHERE user_id = $1 AND comment_id = ANY($2)",
                )
                .bind(user_id)
                .bind(&all_ids)
                .fetch_all(pool.as_ref())
                .await?;
                rows.into_iter().map(|(id,)| id).collect()
            }
        }
        None => HashSet::new(),
    };

    let mut threads: Vec<CommentThread> = top_rows
        .into_iter()
        .map(|row| {
            let liked = liked_ids.contains(&row.id);
            CommentThread {
                comment: row.into_comment(liked),
                replies: Vec::new(),
            }
        })
        .collect();

    for row in reply_rows {
        let liked = liked_ids.contains(&row.id);
        let parent_id = row.parent_id;
        let reply = row.into_comment(liked);
        if let Some(thread) = threads
            .iter_mut()
            .find(|t| Some(t.comment.id) == parent_id)
        {
            thread.replies.push(reply);
        }
    }

    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    Ok(Json(CommentPage {
        comments: threads,
        pagination: PageInfo {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    }))
}

/// POST /api/artbooks/:slug/comments - Create a comment or reply (auth required)
pub async fn create_comment(
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let author_id = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let content = sanitize_comment(&payload.content)?;

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;

    if let Some(parent_id) = payload.parent_id {
        let parent: Option<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT post_id, parent_id FROM comments WHERE id = $1")
                .bind(parent_id)
                .fetch_optional(pool.as_ref())
                .await?;
        let (parent_post, grandparent) = parent
            .ok_or_else(|| ApiError::NotFound("Parent comment not found".to_string()))?;

        let parent_depth = comment_depth(pool.as_ref(), grandparent).await?;
        check_reply_target(parent_post, resolved.post_id, parent_depth)?;
    }

    let author: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT name, image FROM users WHERE id = $1")
            .bind(author_id)
            .fetch_optional(pool.as_ref())
            .await?;
    let (author_name, author_image) =
        author.ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

    let (id, created_at, updated_at): (Uuid, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO comments (post_id, author_id, parent_id, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, created_at, updated_at
        "#,
    )
    .bind(resolved.post_id)
    .bind(author_id)
    .bind(payload.parent_id)
    .bind(&content)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(comment_id = %id, artbook = %slug, "comment created");

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            comment: EnrichedComment {
                id,
                content,
                parent_id: payload.parent_id,
                author: CommentAuthor {
                    id: author_id,
                    name: author_name,
                    image: author_image,
                },
                reply_count: 0,
                like_count: 0,
                viewer_liked: false,
                created_at,
                updated_at,
            },
        }),
    ))
}

/// PUT /api/artbooks/:slug/comments/:id - Edit own comment (auth required)
pub async fn update_comment(
    Path((slug, comment_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let requester = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let content = sanitize_comment(&payload.content)?;

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;
    let (author_id, _) = fetch_owned(pool.as_ref(), comment_id, &resolved).await?;

    if author_id != requester {
        return Err(ApiError::Forbidden(
            "Only the author can edit this comment".to_string(),
        ));
    }

    sqlx::query("UPDATE comments SET content = $1, updated_at = now() WHERE id = $2")
        .bind(&content)
        .bind(comment_id)
        .execute(pool.as_ref())
        .await?;

    let comment =
        fetch_enriched(pool.as_ref(), comment_id, resolved.post_id, Some(requester)).await?;

    Ok(Json(CommentResponse { comment }))
}

/// DELETE /api/artbooks/:slug/comments/:id - Delete own comment (auth required)
///
/// A comment with replies cannot be deleted; orphaning reply subtrees is
/// never allowed.
pub async fn delete_comment(
    Path((slug, comment_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, ApiError> {
    let requester = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;
    let (author_id, reply_count) = fetch_owned(pool.as_ref(), comment_id, &resolved).await?;
    check_delete(author_id, requester, reply_count)?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(pool.as_ref())
        .await?;

    tracing::info!(comment_id = %comment_id, artbook = %slug, "comment deleted");

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, put};
    use axum::Router;
    use tower::ServiceExt;

    fn comment_router() -> Router {
        Router::new()
            .route(
                "/api/artbooks/{slug}/comments",
                get(list_comments).post(create_comment),
            )
            .route(
                "/api/artbooks/{slug}/comments/{id}",
                put(update_comment).delete(delete_comment),
            )
    }

    fn bearer_for(user: Uuid) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let now = chrono::Utc::now();
        let claims = crate::auth::Claims {
            sub: user.to_string(),
            exp: (now + chrono::Duration::minutes(15)).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(crate::auth::JWT_SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn create_without_session_is_unauthorized() {
        let req = Request::post("/api/artbooks/fairy-tale/comments")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"Nice!"}"#))
            .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_with_invalid_slug_is_bad_request() {
        let req = Request::post("/api/artbooks/Not%20A%20Slug/comments")
            .header("authorization", bearer_for(Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"Nice!"}"#))
            .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_with_empty_content_is_bad_request() {
        let req = Request::post("/api/artbooks/fairy-tale/comments")
            .header("authorization", bearer_for(Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"<script></script>"}"#))
            .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_with_oversize_content_is_bad_request() {
        let body = serde_json::json!({ "content": "a".repeat(1001) });
        let req = Request::post("/api/artbooks/fairy-tale/comments")
            .header("authorization", bearer_for(Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_with_invalid_slug_is_bad_request() {
        let req = Request::get("/api/artbooks/UPPER/comments")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_without_session_is_unauthorized() {
        let req = Request::delete(format!(
            "/api/artbooks/fairy-tale/comments/{}",
            Uuid::new_v4()
        ))
        .body(Body::empty())
        .unwrap();
        assert_eq!(send(comment_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn page_info_math() {
        // 21 top-level comments at 10 per page.
        let total: i64 = 21;
        let limit: i64 = 10;
        let total_pages = (total + limit - 1) / limit;
        assert_eq!(total_pages, 3);
    }

    /// Walk a parent chain held in a map, the way `comment_depth` walks rows.
    fn depth_via(
        parents: &std::collections::HashMap<Uuid, Option<Uuid>>,
        start: Option<Uuid>,
    ) -> i64 {
        let mut walk = DepthWalk::new(start);
        while let Some(pid) = walk.next_lookup() {
            walk.advance(parents.get(&pid).copied().flatten());
        }
        walk.depth()
    }

    #[test]
    fn depth_walk_counts_parent_hops() {
        // c3 -> c2 -> c1 -> (top level)
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();
        let c3 = Uuid::new_v4();
        let parents = std::collections::HashMap::from([
            (c1, None),
            (c2, Some(c1)),
            (c3, Some(c2)),
        ]);

        assert_eq!(depth_via(&parents, None), 0);
        assert_eq!(depth_via(&parents, Some(c1)), 1);
        assert_eq!(depth_via(&parents, Some(c2)), 2);
        // Deeper chains stop at the cap instead of walking further.
        assert_eq!(depth_via(&parents, Some(c3)), 3);
    }

    #[test]
    fn reply_at_depth_two_is_accepted_depth_three_is_conflict() {
        let post = Uuid::new_v4();
        // Parent at depth 1: the reply lands at depth 2, the deepest allowed.
        assert!(check_reply_target(post, post, 1).is_ok());
        // Parent already at depth 2: the reply would land at depth 3.
        assert!(matches!(
            check_reply_target(post, post, MAX_COMMENT_DEPTH),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn reply_to_parent_from_another_artbook_is_conflict() {
        let post = Uuid::new_v4();
        let other_post = Uuid::new_v4();
        assert!(matches!(
            check_reply_target(other_post, post, 0),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn delete_with_replies_is_conflict() {
        let author = Uuid::new_v4();
        assert!(check_delete(author, author, 0).is_ok());
        assert!(matches!(
            check_delete(author, author, 1),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn delete_by_non_author_is_forbidden() {
        let author = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        assert!(matches!(
            check_delete(author, stranger, 0),
            Err(ApiError::Forbidden(_))
        ));
    }
}
