//! TikTok client: HTML-rehydration profile extraction plus the item-list
//! cursor API.
//!
//! The profile page embeds a `__UNIVERSAL_DATA_FOR_REHYDRATION__` script
//! whose JSON carries the user detail; content pages come from
//! `/api/post/item_list/` keyed by the profile's `secUid`. Blocks on this
//! platform rotate the session rather than the proxy tier, so the client is
//! always paired with the pinned residential policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::ScrapeError;
use crate::modules::executor::ScrapeRequest;
use crate::modules::pagination::{Page, PageSource};
use crate::modules::session::{Session, SessionAcquirer};
use crate::types::{ContentItem, Platform, Profile};

use super::{send_authed, BaseFetch, PlatformClient, SecondaryPlan, SharedExecutor};

const BASE_URL: &str = "https://www.tiktok.com";

static REHYDRATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<script[^>]*id="__UNIVERSAL_DATA_FOR_REHYDRATION__"[^>]*>(.*?)</script>"#,
    )
    .expect("rehydration regex is valid")
});

/// Landing fetch harvesting the anti-bot cookies (`msToken`, `ttwid`) the
/// item-list API expects alongside a browser fingerprint.
pub struct TikTokSessionAcquirer {
    executor: SharedExecutor,
    ttl: Duration,
}

#[async_trait]
impl SessionAcquirer for TikTokSessionAcquirer {
    async fn acquire_session(&self) -> Result<Session, ScrapeError> {
        let url = Url::parse(BASE_URL)
            .map_err(|e| ScrapeError::Parse(format!("bad base url: {e}")))?;
        let response = self.executor.execute(&ScrapeRequest::get(url)).await?;
        log::debug!(
            "acquired tiktok session ({} cookies)",
            response.set_cookies.len()
        );
        Ok(Session::new(response.set_cookies.clone(), None, self.ttl))
    }
}

pub struct TikTokClient {
    executor: SharedExecutor,
    acquirer: Arc<TikTokSessionAcquirer>,
}

impl TikTokClient {
    pub fn new(executor: SharedExecutor, session_ttl: Duration) -> Self {
        let acquirer = Arc::new(TikTokSessionAcquirer {
            executor: executor.clone(),
            ttl: session_ttl,
        });
        Self { executor, acquirer }
    }
}

#[async_trait]
impl PlatformClient for TikTokClient {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn fetch_base(&self, username: &str) -> Result<BaseFetch, ScrapeError> {
        let url = Url::parse(&format!("{BASE_URL}/@{username}"))
            .map_err(|e| ScrapeError::Parse(format!("bad profile url: {e}")))?;

        let response = send_authed(&self.executor, self.acquirer.as_ref(), |session| {
            let mut request = ScrapeRequest::get(url.clone());
            if !session.cookies.is_empty() {
                request
                    .headers
                    .push(("cookie".to_string(), session.cookie_header()));
            }
            request
        })
        .await?;

        let html = String::from_utf8_lossy(&response.body);
        let rehydration = extract_rehydration_json(&html)?;
        let user_info = rehydration
            .pointer("/__DEFAULT_SCOPE__/webapp.user-detail/userInfo")
            .ok_or_else(|| {
                ScrapeError::Parse("rehydration data missing webapp.user-detail".to_string())
            })?;

        let profile = parse_user_info(user_info)?;
        let sec_uid = json_str(user_info, "/user/secUid");

        Ok(BaseFetch {
            profile,
            initial_items: Vec::new(),
            next_cursor: None,
            pagination_handle: sec_uid,
        })
    }

    fn timeline_source(&self, base: &BaseFetch) -> Option<Box<dyn PageSource>> {
        let sec_uid = base.pagination_handle.clone()?;
        Some(Box::new(ItemListSource {
            executor: self.executor.clone(),
            acquirer: self.acquirer.clone(),
            sec_uid,
            username: base.profile.username.clone(),
        }))
    }

    /// TikTok has no distinct secondary content source; everything is video.
    fn secondary_plan(&self, _base: &BaseFetch) -> Option<SecondaryPlan> {
        None
    }
}

struct ItemListSource {
    executor: SharedExecutor,
    acquirer: Arc<TikTokSessionAcquirer>,
    sec_uid: String,
    username: String,
}

#[async_trait]
impl PageSource for ItemListSource {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, ScrapeError> {
        let mut url = Url::parse(&format!("{BASE_URL}/api/post/item_list/"))
            .map_err(|e| ScrapeError::Parse(format!("bad item list url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("aid", "1988")
            .append_pair("secUid", &self.sec_uid)
            .append_pair("count", &page_size.to_string())
            .append_pair("cursor", cursor.unwrap_or("0"));

        let response = send_authed(&self.executor, self.acquirer.as_ref(), |session| {
            let mut request = ScrapeRequest::get(url.clone());
            if !session.cookies.is_empty() {
                request
                    .headers
                    .push(("cookie".to_string(), session.cookie_header()));
            }
            request
        })
        .await?;

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ScrapeError::Parse(format!("item list body not json: {e}")))?;
        parse_item_list(&body, &self.username)
    }

    fn label(&self) -> &'static str {
        "tiktok-item-list"
    }
}

/// Pull the rehydration JSON out of the profile HTML. The structured
/// selector path is primary; the regex handles markup the parser rejects.
fn extract_rehydration_json(html: &str) -> Result<Value, ScrapeError> {
    let raw = select_rehydration_script(html)
        .or_else(|| {
            REHYDRATION_RE
                .captures(html)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .ok_or_else(|| {
            ScrapeError::Parse("profile html carries no rehydration script".to_string())
        })?;

    serde_json::from_str(&raw)
        .map_err(|e| ScrapeError::Parse(format!("rehydration script not json: {e}")))
}

fn select_rehydration_script(html: &str) -> Option<String> {
    let selector = Selector::parse("script#__UNIVERSAL_DATA_FOR_REHYDRATION__").ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;
    let text: String = element.text().collect();
    (!text.trim().is_empty()).then_some(text)
}

fn parse_user_info(user_info: &Value) -> Result<Profile, ScrapeError> {
    let username = json_str(user_info, "/user/uniqueId")
        .ok_or_else(|| ScrapeError::Parse("user detail missing uniqueId".to_string()))?;
    Ok(Profile {
        username,
        user_id: json_str(user_info, "/user/id"),
        full_name: json_str(user_info, "/user/nickname").unwrap_or_default(),
        biography: json_str(user_info, "/user/signature").unwrap_or_default(),
        profile_pic_url: json_str(user_info, "/user/avatarLarger").unwrap_or_default(),
        external_url: json_str(user_info, "/user/bioLink/link"),
        is_private: user_info
            .pointer("/user/privateAccount")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        follower_count: json_u64(user_info, "/stats/followerCount"),
        following_count: json_u64(user_info, "/stats/followingCount"),
        media_count: json_u64(user_info, "/stats/videoCount"),
    })
}

/// Parse an item-list response. The cursor arrives as a string or a number
/// depending on upstream version; both are accepted.
fn parse_item_list(body: &Value, username: &str) -> Result<Page, ScrapeError> {
    let items = match body.pointer("/itemList") {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|item| parse_item(item, username))
            .collect(),
        // An exhausted account legitimately returns no itemList at all.
        Some(Value::Null) | None if !has_more(body) => Vec::new(),
        _ => {
            return Err(ScrapeError::Parse(
                "item list response missing itemList array".to_string(),
            ))
        }
    };

    let next_cursor = if has_more(body) {
        match body.pointer("/cursor") {
            Some(Value::String(cursor)) => Some(cursor.clone()),
            Some(Value::Number(cursor)) => Some(cursor.to_string()),
            _ => None,
        }
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}

fn has_more(body: &Value) -> bool {
    body.pointer("/hasMore")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn parse_item(item: &Value, username: &str) -> Option<ContentItem> {
    let id = match item.pointer("/id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return None,
    };
    let taken_at = item
        .pointer("/createTime")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Some(ContentItem {
        url: Some(format!("{BASE_URL}/@{username}/video/{id}")),
        caption: json_str(item, "/desc").unwrap_or_default(),
        is_video: true,
        like_count: json_u64(item, "/stats/diggCount"),
        comment_count: json_u64(item, "/stats/commentCount"),
        view_count: item.pointer("/stats/playCount").and_then(Value::as_u64),
        display_url: json_str(item, "/video/cover"),
        taken_at,
        id,
    })
}

fn json_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn json_u64(value: &Value, pointer: &str) -> u64 {
    value.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rehydration_payload() -> String {
        serde_json::json!({
            "__DEFAULT_SCOPE__": {
                "webapp.user-detail": {
                    "userInfo": {
                        "user": {
                            "id": "66",
                            "secUid": "MS4wLjABAAAA",
                            "uniqueId": "cookingdaily",
                            "nickname": "Cooking Daily",
                            "signature": "recipes",
                            "avatarLarger": "https://cdn.test/avatar.jpg",
                            "privateAccount": false
                        },
                        "stats": {
                            "followerCount": 5000,
                            "followingCount": 10,
                            "videoCount": 87
                        }
                    }
                }
            }
        })
        .to_string()
    }

    fn profile_html() -> String {
        format!(
            "<html><body><script id=\"__UNIVERSAL_DATA_FOR_REHYDRATION__\" \
             type=\"application/json\">{}</script></body></html>",
            rehydration_payload()
        )
    }

    #[test]
    fn rehydration_extracts_user_detail() {
        let value = extract_rehydration_json(&profile_html()).unwrap();
        let user_info = value
            .pointer("/__DEFAULT_SCOPE__/webapp.user-detail/userInfo")
            .unwrap();
        let profile = parse_user_info(user_info).unwrap();
        assert_eq!(profile.username, "cookingdaily");
        assert_eq!(profile.follower_count, 5000);
        assert_eq!(profile.media_count, 87);
    }

    #[test]
    fn regex_fallback_handles_unparseable_markup() {
        // Unclosed tag ahead of the script trips strict parsing paths.
        let html = format!(
            "<div <broken><script id=\"__UNIVERSAL_DATA_FOR_REHYDRATION__\">{}</script>",
            rehydration_payload()
        );
        assert!(extract_rehydration_json(&html).is_ok());
    }

    #[test]
    fn html_without_script_is_structural_drift() {
        assert!(matches!(
            extract_rehydration_json("<html><body>captcha</body></html>"),
            Err(ScrapeError::Parse(_))
        ));
    }

    #[test]
    fn item_list_parses_items_and_cursor() {
        let body = serde_json::json!({
            "itemList": [
                {
                    "id": "731",
                    "desc": "pasta night",
                    "createTime": 1700000000,
                    "stats": {"diggCount": 40, "commentCount": 5, "playCount": 900},
                    "video": {"cover": "https://cdn.test/cover.jpg"}
                }
            ],
            "hasMore": true,
            "cursor": 1700000000123i64
        });
        let page = parse_item_list(&body, "cookingdaily").unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("1700000000123"));

        let item = &page.items[0];
        assert_eq!(
            item.url.as_deref(),
            Some("https://www.tiktok.com/@cookingdaily/video/731")
        );
        assert!(item.is_video);
        assert_eq!(item.view_count, Some(900));
    }

    #[test]
    fn exhausted_item_list_has_no_cursor() {
        let body = serde_json::json!({"itemList": [], "hasMore": false, "cursor": "0"});
        let page = parse_item_list(&body, "cookingdaily").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn missing_item_list_while_more_claimed_is_drift() {
        let body = serde_json::json!({"hasMore": true, "cursor": "10"});
        assert!(matches!(
            parse_item_list(&body, "cookingdaily"),
            Err(ScrapeError::Parse(_))
        ));
    }
}
