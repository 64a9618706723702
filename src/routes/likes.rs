/**
 * Like Routes
 * Idempotent like toggles for artbooks and comments
 */
use axum::{
    extract::Path,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{optional_user, require_user};
use crate::error::{is_unique_violation, ApiError};
use crate::routes::{require_pool, resolve_post};
use crate::slug::is_valid_slug;

// ============================================================================
// Response Types
// ============================================================================

/// Response for POST .../like (toggle)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeResponse {
    pub liked: bool,
    pub like_count: i64,
    pub message: String,
}

/// Response for GET .../like (status)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatusResponse {
    pub user_liked: bool,
    pub like_count: i64,
}

// ============================================================================
// Helpers
// ============================================================================

/// Toggle a like row identified by (user, target) in `table`/`column`.
///
/// Likes are represented purely by row existence. The toggle is a
/// read-then-write: two concurrent toggles from the same user race on the
/// unique constraint, and the losing insert is converted into the
/// idempotent "liked" response instead of an error.
async fn toggle_row(
    pool: &PgPool,
    table: &str,
    column: &str,
    user_id: Uuid,
    target_id: Uuid,
) -> Result<bool, ApiError> {
    let exists_sql = format!(
        "SELECT 1 FROM {table} WHERE user_id = $1 AND {column} = $2"
    );
    let existing: Option<(i32,)> = sqlx::query_as(&exists_sql)
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        let delete_sql = format!(
            "DELETE FROM {table} WHERE user_id = $1 AND {column} = $2"
        );
        sqlx::query(&delete_sql)
            .bind(user_id)
            .bind(target_id)
            .execute(pool)
            .await?;
        return Ok(false);
    }

    let insert_sql = format!(
        "INSERT INTO {table} (user_id, {column}) VALUES ($1, $2)"
    );
    match sqlx::query(&insert_sql)
        .bind(user_id)
        .bind(target_id)
        .execute(pool)
        .await
    {
        Ok(_) => Ok(true),
        // Lost the race against a concurrent toggle: the row exists, which
        // is exactly the state this call was trying to reach.
        Err(e) if is_unique_violation(&e) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Freshly aggregated like count, never a cached column.
async fn count_rows(
    pool: &PgPool,
    table: &str,
    column: &str,
    target_id: Uuid,
) -> Result<i64, ApiError> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = $1");
    let (count,): (i64,) = sqlx::query_as(&sql).bind(target_id).fetch_one(pool).await?;
    Ok(count)
}

async fn user_liked(
    pool: &PgPool,
    table: &str,
    column: &str,
    user_id: Uuid,
    target_id: Uuid,
) -> Result<bool, ApiError> {
    let sql = format!("SELECT 1 FROM {table} WHERE user_id = $1 AND {column} = $2");
    let row: Option<(i32,)> = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Cross-content isolation: the comment must exist and belong to the named
/// artbook's post.
fn check_comment_post(comment_post: Option<Uuid>, post_id: Uuid) -> Result<(), ApiError> {
    match comment_post {
        Some(p) if p == post_id => Ok(()),
        Some(_) => Err(ApiError::Conflict(
            "Comment belongs to a different artbook".to_string(),
        )),
        None => Err(ApiError::NotFound("Comment not found".to_string())),
    }
}

/// Resolve a comment id within the named artbook's post, failing Conflict
/// when the comment belongs to a different post.
async fn resolve_comment(
    pool: &PgPool,
    slug: &str,
    comment_id: Uuid,
) -> Result<Uuid, ApiError> {
    let resolved = resolve_post(pool, slug).await?;
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT post_id FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(pool)
        .await?;
    check_comment_post(row.map(|(p,)| p), resolved.post_id)?;
    Ok(comment_id)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/artbooks/:slug/like - Toggle the viewer's like on an artbook
pub async fn toggle_artbook_like(
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let user_id = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;

    let liked = toggle_row(pool.as_ref(), "likes", "post_id", user_id, resolved.post_id).await?;
    let like_count = count_rows(pool.as_ref(), "likes", "post_id", resolved.post_id).await?;

    Ok(Json(ToggleLikeResponse {
        liked,
        like_count,
        message: if liked {
            "Artbook liked".to_string()
        } else {
            "Artbook unliked".to_string()
        },
    }))
}

/// GET /api/artbooks/:slug/like - Like status and count for page hydration
pub async fn artbook_like_status(
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LikeStatusResponse>, ApiError> {
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let viewer = optional_user(&headers);
    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;

    let like_count = count_rows(pool.as_ref(), "likes", "post_id", resolved.post_id).await?;
    let liked = match viewer {
        Some(user_id) => {
            user_liked(pool.as_ref(), "likes", "post_id", user_id, resolved.post_id).await?
        }
        None => false,
    };

    Ok(Json(LikeStatusResponse {
        user_liked: liked,
        like_count,
    }))
}

/// POST /api/artbooks/:slug/comments/:id/like - Toggle a comment like
pub async fn toggle_comment_like(
    Path((slug, comment_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let user_id = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let pool = require_pool()?;
    let comment_id = resolve_comment(pool.as_ref(), &slug, comment_id).await?;

    let liked = toggle_row(
        pool.as_ref(),
        "comment_likes",
        "comment_id",
        user_id,
        comment_id,
    )
    .await?;
    let like_count =
        count_rows(pool.as_ref(), "comment_likes", "comment_id", comment_id).await?;

    Ok(Json(ToggleLikeResponse {
        liked,
        like_count,
        message: if liked {
            "Comment liked".to_string()
        } else {
            "Comment unliked".to_string()
        },
    }))
}

/// GET /api/artbooks/:slug/comments/:id/like - Comment like status
pub async fn comment_like_status(
    Path((slug, comment_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<LikeStatusResponse>, ApiError> {
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let viewer = optional_user(&headers);
    let pool = require_pool()?;
    let comment_id = resolve_comment(pool.as_ref(), &slug, comment_id).await?;

    let like_count =
        count_rows(pool.as_ref(), "comment_likes", "comment_id", comment_id).await?;
    let liked = match viewer {
        Some(user_id) => {
            user_liked(
                pool.as_ref(),
                "comment_likes",
                "comment_id",
                user_id,
                comment_id,
            )
            .await?
        }
        None => false,
    };

    Ok(Json(LikeStatusResponse {
        user_liked: liked,
        like_count,
    }))
}
