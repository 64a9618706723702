//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;

/// User model (rows provisioned by the external identity service).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Closed artbook category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtbookCategory {
    Fantasy,
    Adventure,
    FairyTale,
    Animals,
    SciFi,
    Everyday,
    Other,
}

impl ArtbookCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtbookCategory::Fantasy => "fantasy",
            ArtbookCategory::Adventure => "adventure",
            ArtbookCategory::FairyTale => "fairy-tale",
            ArtbookCategory::Animals => "animals",
            ArtbookCategory::SciFi => "sci-fi",
            ArtbookCategory::Everyday => "everyday",
            ArtbookCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "fantasy" => Ok(ArtbookCategory::Fantasy),
            "adventure" => Ok(ArtbookCategory::Adventure),
            "fairy-tale" => Ok(ArtbookCategory::FairyTale),
            "animals" => Ok(ArtbookCategory::Animals),
            "sci-fi" => Ok(ArtbookCategory::SciFi),
            "everyday" => Ok(ArtbookCategory::Everyday),
            "other" => Ok(ArtbookCategory::Other),
            other => Err(ApiError::Validation(format!(
                "Unknown category: {}",
                other
            ))),
        }
    }
}

/// Closed report category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportCategory {
    Spam,
    Inappropriate,
    Copyright,
    Other,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Spam => "spam",
            ReportCategory::Inappropriate => "inappropriate",
            ReportCategory::Copyright => "copyright",
            ReportCategory::Other => "other",
        }
    }
}

/// Artbook model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artbook {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub owner_id: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storybook page model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    pub artbook_id: Uuid,
    pub page_index: i32,
    pub text: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Engagement aggregate, one-to-one with an artbook.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub artbook_id: Uuid,
    pub view_count: i64,
}

/// Raw comment row. `parent_id` is immutable after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author info embedded in enriched comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

/// Comment enriched for the wire: author info, derived counts, and the
/// requesting viewer's like state. The single shape used by both flat and
/// nested consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedComment {
    pub id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub author: CommentAuthor,
    pub reply_count: i64,
    pub like_count: i64,
    pub viewer_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for s in [
            "fantasy",
            "adventure",
            "fairy-tale",
            "animals",
            "sci-fi",
            "everyday",
            "other",
        ] {
            assert_eq!(ArtbookCategory::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn unknown_category_is_validation_error() {
        assert!(matches!(
            ArtbookCategory::parse("horror"),
            Err(ApiError::Validation(_))
        ));
    }
}
