/**
 * Artbook Routes
 * CRUD API endpoints for illustrated storybooks and their engagement aggregates
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{optional_user, require_user};
use crate::db::models::{Artbook, ArtbookCategory, Page};
use crate::error::ApiError;
use crate::routes::{require_pool, resolve_post};
use crate::slug::{is_valid_slug, unique_slug};

/// Maximum pages per artbook.
const MAX_PAGES: usize = 30;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/artbooks (list)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtbookListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub category: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

/// One page of a storybook, as submitted on creation.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInput {
    pub text: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Request body for POST /api/artbooks (create)
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtbookRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: ArtbookCategory,
    #[serde(default)]
    pub is_public: Option<bool>,
    pub pages: Vec<PageInput>,
}

/// Request body for PATCH /api/artbooks/:slug (update)
///
/// `description` distinguishes an absent field (keep the current value)
/// from an explicit `null` (clear it), so it deserializes to a double
/// Option.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArtbookRequest {
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    pub category: Option<ArtbookCategory>,
    pub is_public: Option<bool>,
}

/// Deserialize a present field as `Some(inner)` so that `null` becomes
/// `Some(None)` instead of collapsing into the missing-field `None`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Artbook summary (for list view), with derived engagement counts.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtbookSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub owner_id: Uuid,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Response for GET /api/artbooks (list)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtbookListResponse {
    pub items: Vec<ArtbookSummary>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Full artbook response with pages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtbookResponse {
    #[serde(flatten)]
    pub artbook: Artbook,
    pub pages: Vec<Page>,
    pub view_count: i64,
}

/// Success response (for delete)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/artbooks - List public artbooks with derived engagement counts
pub async fn list_artbooks(
    Query(query): Query<ArtbookListQuery>,
) -> Result<Json<ArtbookListResponse>, ApiError> {
    if let Some(ref category) = query.category {
        // Closed enum; reject unknown filters before touching the database.
        ArtbookCategory::parse(category)?;
    }
    let pool = require_pool()?;

    let page_size = query.page_size.clamp(1, 50);
    let page = query.page.max(1);
    let offset = (page - 1) * page_size;

    let base_filter = match &query.category {
        Some(_) => "WHERE a.is_public AND a.category = $3",
        None => "WHERE a.is_public",
    };

    let list_sql = format!(
        r#"
        SELECT a.id, a.title, a.slug, a.description, a.category, a.owner_id,
               p.view_count,
               (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
               (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
               a.created_at
        FROM artbooks a
        JOIN posts p ON p.artbook_id = a.id
        {base_filter}
        ORDER BY a.created_at DESC
        LIMIT $1 OFFSET $2
        "#
    );

    type SummaryRow = (
        Uuid,
        String,
        String,
        Option<String>,
        String,
        Uuid,
        i64,
        i64,
        i64,
        DateTime<Utc>,
    );
    let (rows, total): (Vec<SummaryRow>, i64) = match &query.category {
        Some(category) => {
            let rows = sqlx::query_as(&list_sql)
                .bind(page_size)
                .bind(offset)
                .bind(category)
                .fetch_all(pool.as_ref())
                .await?;
            let (total,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM artbooks a WHERE a.is_public AND a.category = $1",
            )
            .bind(category)
            .fetch_one(pool.as_ref())
            .await?;
            (rows, total)
        }
        None => {
            let rows = sqlx::query_as(&list_sql)
                .bind(page_size)
                .bind(offset)
                .fetch_all(pool.as_ref())
                .await?;
            let (total,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM artbooks a WHERE a.is_public")
                    .fetch_one(pool.as_ref())
                    .await?;
            (rows, total)
        }
    };

    let items = rows
        .into_iter()
        .map(
            |(
                id,
                title,
                slug,
                description,
                category,
                owner_id,
                view_count,
                like_count,
                comment_count,
                created_at,
            )| ArtbookSummary {
                id,
                title,
                slug,
                description,
                category,
                owner_id,
                view_count,
                like_count,
                comment_count,
                created_at,
            },
        )
        .collect();

    Ok(Json(ArtbookListResponse {
        items,
        page,
        page_size,
        total,
    }))
}

/// GET /api/artbooks/:slug - Full artbook with pages; bumps the view counter
pub async fn get_artbook(
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ArtbookResponse>, ApiError> {
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let viewer = optional_user(&headers);
    let pool = require_pool()?;

    let artbook: Option<Artbook> = sqlx::query_as(
        r#"
        SELECT id, title, slug, description, category, owner_id, is_public,
               created_at, updated_at
        FROM artbooks
        WHERE slug = $1
        "#,
    )
    .bind(&slug)
    .fetch_optional(pool.as_ref())
    .await?;

    let artbook = artbook.ok_or_else(|| ApiError::NotFound("Artbook not found".to_string()))?;
    if !artbook.is_public && viewer != Some(artbook.owner_id) {
        // Private artbooks are indistinguishable from absent ones.
        return Err(ApiError::NotFound("Artbook not found".to_string()));
    }

    let pages: Vec<Page> = sqlx::query_as(
        r#"
        SELECT id, artbook_id, page_index, text, image_url, audio_url
        FROM pages
        WHERE artbook_id = $1
        ORDER BY page_index ASC
        "#,
    )
    .bind(artbook.id)
    .fetch_all(pool.as_ref())
    .await?;

    // Monotonic view counter, bumped on every successful read.
    let (view_count,): (i64,) = sqlx::query_as(
        "UPDATE posts SET view_count = view_count + 1 WHERE artbook_id = $1 RETURNING view_count",
    )
    .bind(artbook.id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(Json(ArtbookResponse {
        artbook,
        pages,
        view_count,
    }))
}

/// POST /api/artbooks - Create artbook + post + pages in one transaction (auth required)
pub async fn create_artbook(
    headers: HeaderMap,
    Json(payload): Json<CreateArtbookRequest>,
) -> Result<(StatusCode, Json<ArtbookResponse>), ApiError> {
    let owner_id = require_user(&headers)?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    if payload.pages.is_empty() {
        return Err(ApiError::Validation(
            "An artbook needs at least one page".to_string(),
        ));
    }
    if payload.pages.len() > MAX_PAGES {
        return Err(ApiError::Validation(format!(
            "An artbook cannot have more than {} pages",
            MAX_PAGES
        )));
    }

    let pool = require_pool()?;
    let slug = unique_slug(pool.as_ref(), &payload.title, None).await?;

    let mut tx = pool.begin().await?;

    let artbook: Artbook = sqlx::query_as(
        r#"
        INSERT INTO artbooks (title, slug, description, category, owner_id, is_public)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, title, slug, description, category, owner_id, is_public,
                  created_at, updated_at
        "#,
    )
    .bind(payload.title.trim())
    .bind(&slug)
    .bind(&payload.description)
    .bind(payload.category.as_str())
    .bind(owner_id)
    .bind(payload.is_public.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO posts (artbook_id) VALUES ($1)")
        .bind(artbook.id)
        .execute(&mut *tx)
        .await?;

    let mut pages = Vec::with_capacity(payload.pages.len());
    for (index, input) in payload.pages.iter().enumerate() {
        let page: Page = sqlx::query_as(
            r#"
            INSERT INTO pages (artbook_id, page_index, text, image_url, audio_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, artbook_id, page_index, text, image_url, audio_url
            "#,
        )
        .bind(artbook.id)
        .bind(index as i32)
        .bind(&input.text)
        .bind(&input.image_url)
        .bind(&input.audio_url)
        .fetch_one(&mut *tx)
        .await?;
        pages.push(page);
    }

    tx.commit().await?;

    tracing::info!(artbook_id = %artbook.id, slug = %slug, "artbook created");

    Ok((
        StatusCode::CREATED,
        Json(ArtbookResponse {
            artbook,
            pages,
            view_count: 0,
        }),
    ))
}

/// PATCH /api/artbooks/:slug - Update own artbook (auth required)
///
/// A title change derives a fresh unique slug; all other fields leave the
/// slug untouched.
pub async fn update_artbook(
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateArtbookRequest>,
) -> Result<Json<ArtbookResponse>, ApiError> {
    let requester = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    if let Some(ref title) = payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::Validation("Title cannot be empty".to_string()));
        }
    }

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;
    if resolved.owner_id != requester {
        return Err(ApiError::Forbidden(
            "Only the owner can update this artbook".to_string(),
        ));
    }

    let existing: Artbook = sqlx::query_as(
        r#"
        SELECT id, title, slug, description, category, owner_id, is_public,
               created_at, updated_at
        FROM artbooks
        WHERE id = $1
        "#,
    )
    .bind(resolved.artbook_id)
    .fetch_one(pool.as_ref())
    .await?;

    let (title, new_slug) = match payload.title {
        Some(ref title) if title.trim() != existing.title => {
            let new_slug =
                unique_slug(pool.as_ref(), title, Some(resolved.artbook_id)).await?;
            (title.trim().to_string(), new_slug)
        }
        _ => (existing.title.clone(), existing.slug.clone()),
    };
    let description = match payload.description {
        Some(description) => description,
        None => existing.description,
    };
    let category = payload
        .category
        .map(|c| c.as_str().to_string())
        .unwrap_or(existing.category);
    let is_public = payload.is_public.unwrap_or(existing.is_public);

    let artbook: Artbook = sqlx::query_as(
        r#"
        UPDATE artbooks
        SET title = $1, slug = $2, description = $3, category = $4,
            is_public = $5, updated_at = now()
        WHERE id = $6
        RETURNING id, title, slug, description, category, owner_id, is_public,
                  created_at, updated_at
        "#,
    )
    .bind(&title)
    .bind(&new_slug)
    .bind(&description)
    .bind(&category)
    .bind(is_public)
    .bind(resolved.artbook_id)
    .fetch_one(pool.as_ref())
    .await?;

    let pages: Vec<Page> = sqlx::query_as(
        r#"
        SELECT id, artbook_id, page_index, text, image_url, audio_url
        FROM pages
        WHERE artbook_id = $1
        ORDER BY page_index ASC
        "#,
    )
    .bind(artbook.id)
    .fetch_all(pool.as_ref())
    .await?;

    let (view_count,): (i64,) =
        sqlx::query_as("SELECT view_count FROM posts WHERE artbook_id = $1")
            .bind(artbook.id)
            .fetch_one(pool.as_ref())
            .await?;

    Ok(Json(ArtbookResponse {
        artbook,
        pages,
        view_count,
    }))
}

/// DELETE /api/artbooks/:slug - Delete own artbook and everything under it
///
/// Explicit ordered cascade in one transaction so partial completion is
/// never observable: comment likes, likes, comments, post, pages, artbook.
pub async fn delete_artbook(
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, ApiError> {
    let requester = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;
    if resolved.owner_id != requester {
        return Err(ApiError::Forbidden(
            "Only the owner can delete this artbook".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM comment_likes
        WHERE comment_id IN (SELECT id FROM comments WHERE post_id = $1)
        "#,
    )
    .bind(resolved.post_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM likes WHERE post_id = $1")
        .bind(resolved.post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM comments WHERE post_id = $1")
        .bind(resolved.post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(resolved.post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM pages WHERE artbook_id = $1")
        .bind(resolved.artbook_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM artbooks WHERE id = $1")
        .bind(resolved.artbook_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(artbook = %slug, "artbook deleted");

    Ok(Json(SuccessResponse { success: true }))
}
