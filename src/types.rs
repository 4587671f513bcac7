//! Domain and wire types shared by the orchestrator, platform clients, and
//! the HTTP surface.
//!
//! Field names serialize in camelCase to match the downstream pipeline
//! consumers of this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// Target platform. Used only for labelling results and logs; every stateful
/// component is instantiated once per platform so nothing branches on this
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

/// Outcome of an orchestrated scrape call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Success,
    Partial,
    Failed,
}

/// Normalized profile fields common to both platforms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    /// Platform-internal numeric/string id, needed for paginated queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub profile_pic_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub media_count: u64,
}

/// One content record (post, reel, or video).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    /// Canonical public URL of the item when derivable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

/// Options accepted by `scrape_profile`.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeOptions {
    /// Number of timeline items to collect. Zero means profile-only.
    pub max_items: usize,
    /// Also collect the specialized content sub-type (reels) where the
    /// platform has one.
    pub include_secondary: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            max_items: 10,
            include_secondary: true,
        }
    }
}

/// Immutable result of one orchestrated scrape call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileScrape {
    pub platform: Platform,
    #[serde(rename = "subjectIdentifier")]
    pub username: String,
    pub status: ScrapeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    pub items: Vec<ContentItem>,
    pub secondary_items: Vec<ContentItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl ProfileScrape {
    pub fn failed(platform: Platform, username: &str, error: &ScrapeError) -> Self {
        Self {
            platform,
            username: username.to_string(),
            status: ScrapeStatus::Failed,
            profile: None,
            items: Vec::new(),
            secondary_items: Vec::new(),
            error: Some(error.classification().to_string()),
            scraped_at: Utc::now(),
        }
    }
}
