/**
 * Routes Module
 * API route handlers
 */

pub mod artbooks;
pub mod comments;
pub mod health;
pub mod likes;
pub mod reports;

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::slug::is_valid_slug;

/// Artbook resolved down to its engagement aggregate. Every comment/like/
/// report operation starts from this lookup.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPost {
    pub artbook_id: Uuid,
    pub post_id: Uuid,
    pub owner_id: Uuid,
}

/// Fetch the database pool, failing 503 before any query when the server
/// was started without a database.
pub fn require_pool() -> Result<Arc<PgPool>, ApiError> {
    db::get_pool().ok_or(ApiError::Unavailable)
}

/// Resolve an artbook slug to its record and attached post.
///
/// # Errors
/// `Validation` for a malformed slug, `NotFound` when the artbook is absent
/// or has no attached post.
pub async fn resolve_post(pool: &PgPool, slug: &str) -> Result<ResolvedPost, ApiError> {
    if !is_valid_slug(slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }

    let row: Option<(Uuid, Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT a.id, p.id, a.owner_id
        FROM artbooks a
        JOIN posts p ON p.artbook_id = a.id
        WHERE a.slug = $1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((artbook_id, post_id, owner_id)) => Ok(ResolvedPost {
            artbook_id,
            post_id,
            owner_id,
        }),
        None => Err(ApiError::NotFound("Artbook not found".to_string())),
    }
}
