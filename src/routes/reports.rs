/**
 * Report Routes
 * One report per reporter per artbook; triage is out of scope here
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::require_user;
use crate::db::models::ReportCategory;
use crate::error::{is_unique_violation, ApiError};
use crate::routes::{require_pool, resolve_post};
use crate::slug::is_valid_slug;

/// Maximum report description length.
const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Request body for POST /api/artbooks/:slug/report
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub category: ReportCategory,
    pub description: String,
}

/// Response for POST /api/artbooks/:slug/report
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: Uuid,
    pub success: bool,
}

/// POST /api/artbooks/:slug/report - Report an artbook (auth required)
pub async fn create_report(
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportResponse>), ApiError> {
    let reporter_id = require_user(&headers)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::Validation("Invalid slug".to_string()));
    }
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(ApiError::Validation(
            "Report description cannot be empty".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::Validation(format!(
            "Report description exceeds {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }

    let pool = require_pool()?;
    let resolved = resolve_post(pool.as_ref(), &slug).await?;

    if resolved.owner_id == reporter_id {
        return Err(ApiError::Forbidden(
            "You cannot report your own artbook".to_string(),
        ));
    }

    let inserted: Result<(Uuid,), sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO reports (reporter_id, artbook_id, category, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(reporter_id)
    .bind(resolved.artbook_id)
    .bind(payload.category.as_str())
    .bind(description)
    .fetch_one(pool.as_ref())
    .await;

    match inserted {
        Ok((id,)) => {
            tracing::info!(report_id = %id, artbook = %slug, "report created");
            Ok((StatusCode::CREATED, Json(ReportResponse { id, success: true })))
        }
        Err(e) if is_unique_violation(&e) => Err(ApiError::Conflict(
            "You have already reported this artbook".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn report_router() -> Router {
        Router::new().route("/api/artbooks/{slug}/report", post(create_report))
    }

    #[tokio::test]
    async fn report_without_session_is_unauthorized() {
        let body = serde_json::json!({ "category": "spam", "description": "spammy" });
        let req = Request::post("/api/artbooks/fairy-tale/report")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let status = report_router().oneshot(req).await.unwrap().status();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_report_category_is_rejected() {
        let body = serde_json::json!({ "category": "rude", "description": "x" });
        let req = Request::post("/api/artbooks/fairy-tale/report")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let status = report_router().oneshot(req).await.unwrap().status();
        assert!(status.is_client_error());
    }
}
