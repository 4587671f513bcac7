//! Instagram client: REST profile endpoint plus GraphQL `doc_id` pagination.
//!
//! The profile endpoint returns the subject's metadata together with the
//! first timeline page and its cursor; subsequent pages go through the
//! GraphQL query endpoint whose `doc_id` values are configuration (they
//! rotate upstream without notice). Every request carries the `csrftoken`
//! harvested from an unauthenticated landing fetch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use url::Url;

use crate::config::InstagramQueryIds;
use crate::error::ScrapeError;
use crate::modules::executor::ScrapeRequest;
use crate::modules::pagination::{Page, PageSource};
use crate::modules::session::{Session, SessionAcquirer};
use crate::types::{ContentItem, Platform, Profile};

use super::{send_authed, BaseFetch, PlatformClient, SecondaryPlan, SharedExecutor};

const BASE_URL: &str = "https://www.instagram.com";

/// Landing fetch that harvests the `csrftoken` anti-forgery cookie. Goes
/// through the full executor path like any other request.
pub struct InstagramSessionAcquirer {
    executor: SharedExecutor,
    ttl: Duration,
}

#[async_trait]
impl SessionAcquirer for InstagramSessionAcquirer {
    async fn acquire_session(&self) -> Result<Session, ScrapeError> {
        let url = Url::parse(BASE_URL)
            .map_err(|e| ScrapeError::Parse(format!("bad base url: {e}")))?;
        let response = self.executor.execute(&ScrapeRequest::get(url)).await?;

        let csrf = response
            .set_cookies
            .iter()
            .find(|(name, _)| name == "csrftoken")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                ScrapeError::Parse("landing response carried no csrftoken cookie".to_string())
            })?;

        log::debug!("acquired instagram session");
        Ok(Session::new(
            response.set_cookies.clone(),
            Some(csrf),
            self.ttl,
        ))
    }
}

pub struct InstagramClient {
    executor: SharedExecutor,
    acquirer: Arc<InstagramSessionAcquirer>,
    queries: InstagramQueryIds,
}

impl InstagramClient {
    pub fn new(
        executor: SharedExecutor,
        queries: InstagramQueryIds,
        session_ttl: Duration,
    ) -> Self {
        let acquirer = Arc::new(InstagramSessionAcquirer {
            executor: executor.clone(),
            ttl: session_ttl,
        });
        Self {
            executor,
            acquirer,
            queries,
        }
    }

    fn authed_headers(&self, session: &Session) -> Vec<(String, String)> {
        let mut headers = vec![
            ("x-ig-app-id".to_string(), self.queries.app_id.clone()),
            ("cookie".to_string(), session.cookie_header()),
        ];
        if let Some(token) = &session.anti_forgery_token {
            headers.push(("x-csrftoken".to_string(), token.clone()));
        }
        headers
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch_base(&self, username: &str) -> Result<BaseFetch, ScrapeError> {
        let mut url = Url::parse(&format!("{BASE_URL}/api/v1/users/web_profile_info/"))
            .map_err(|e| ScrapeError::Parse(format!("bad profile url: {e}")))?;
        url.query_pairs_mut().append_pair("username", username);

        let response = send_authed(&self.executor, self.acquirer.as_ref(), |session| {
            let mut request = ScrapeRequest::get(url.clone());
            request.headers = self.authed_headers(session);
            request
        })
        .await?;

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ScrapeError::Parse(format!("profile body not json: {e}")))?;
        let user = body
            .pointer("/data/user")
            .filter(|v| !v.is_null())
            .ok_or_else(|| ScrapeError::Parse("profile response missing data.user".to_string()))?;

        let profile = parse_profile(user)?;
        let (initial_items, next_cursor) = match user.pointer("/edge_owner_to_timeline_media") {
            Some(connection) => {
                let page = parse_connection(connection)?;
                (page.items, page.next_cursor)
            }
            None => (Vec::new(), None),
        };

        let pagination_handle = profile.user_id.clone();
        Ok(BaseFetch {
            profile,
            initial_items,
            next_cursor,
            pagination_handle,
        })
    }

    fn timeline_source(&self, base: &BaseFetch) -> Option<Box<dyn PageSource>> {
        let user_id = base.pagination_handle.clone()?;
        Some(Box::new(GraphqlSource {
            executor: self.executor.clone(),
            acquirer: self.acquirer.clone(),
            app_id: self.queries.app_id.clone(),
            doc_id: self.queries.timeline_doc_id.clone(),
            connection_key: "edge_owner_to_timeline_media",
            label: "instagram-timeline",
            user_id,
        }))
    }

    fn secondary_plan(&self, base: &BaseFetch) -> Option<SecondaryPlan> {
        let user_id = base.pagination_handle.clone()?;
        Some(SecondaryPlan {
            source: Box::new(GraphqlSource {
                executor: self.executor.clone(),
                acquirer: self.acquirer.clone(),
                app_id: self.queries.app_id.clone(),
                doc_id: self.queries.reels_doc_id.clone(),
                connection_key: "edge_felix_video_timeline",
                label: "instagram-reels",
                user_id,
            }),
            fallback_filter: |item| item.is_video,
        })
    }
}

/// One GraphQL connection (timeline or reels) as a page source.
struct GraphqlSource {
    executor: SharedExecutor,
    acquirer: Arc<InstagramSessionAcquirer>,
    app_id: String,
    doc_id: String,
    connection_key: &'static str,
    label: &'static str,
    user_id: String,
}

#[async_trait]
impl PageSource for GraphqlSource {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, ScrapeError> {
        let mut variables = serde_json::json!({
            "id": self.user_id,
            "first": page_size,
        });
        if let Some(after) = cursor {
            variables["after"] = Value::String(after.to_string());
        }
        let variables = serde_json::to_string(&variables)
            .map_err(|e| ScrapeError::Parse(format!("variables encode failed: {e}")))?;

        let mut url = Url::parse(&format!("{BASE_URL}/graphql/query/"))
            .map_err(|e| ScrapeError::Parse(format!("bad graphql url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("doc_id", &self.doc_id)
            .append_pair("variables", &variables);

        let app_id = self.app_id.clone();
        let response = send_authed(&self.executor, self.acquirer.as_ref(), move |session| {
            let mut request = ScrapeRequest::get(url.clone());
            request.headers.push(("x-ig-app-id".to_string(), app_id.clone()));
            request
                .headers
                .push(("cookie".to_string(), session.cookie_header()));
            if let Some(token) = &session.anti_forgery_token {
                request.headers.push(("x-csrftoken".to_string(), token.clone()));
            }
            request
        })
        .await?;

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ScrapeError::Parse(format!("{} body not json: {e}", self.label)))?;
        let connection = body
            .pointer(&format!("/data/user/{}", self.connection_key))
            .ok_or_else(|| {
                ScrapeError::Parse(format!("{} response missing {}", self.label, self.connection_key))
            })?;
        parse_connection(connection)
    }

    fn label(&self) -> &'static str {
        self.label
    }
}

fn parse_profile(user: &Value) -> Result<Profile, ScrapeError> {
    let username = json_str(user, "/username")
        .ok_or_else(|| ScrapeError::Parse("user object missing username".to_string()))?;
    Ok(Profile {
        username,
        user_id: json_str(user, "/id"),
        full_name: json_str(user, "/full_name").unwrap_or_default(),
        biography: json_str(user, "/biography").unwrap_or_default(),
        profile_pic_url: json_str(user, "/profile_pic_url_hd")
            .or_else(|| json_str(user, "/profile_pic_url"))
            .unwrap_or_default(),
        external_url: json_str(user, "/external_url"),
        is_private: user
            .pointer("/is_private")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        follower_count: json_u64(user, "/edge_followed_by/count"),
        following_count: json_u64(user, "/edge_follow/count"),
        media_count: json_u64(user, "/edge_owner_to_timeline_media/count"),
    })
}

/// Parse an `edges`/`page_info` connection. A missing `edges` array is
/// structural drift; an individual malformed node is skipped.
fn parse_connection(connection: &Value) -> Result<Page, ScrapeError> {
    let edges = connection
        .pointer("/edges")
        .and_then(Value::as_array)
        .ok_or_else(|| ScrapeError::Parse("connection missing edges array".to_string()))?;

    let items = edges
        .iter()
        .filter_map(|edge| edge.pointer("/node"))
        .filter_map(parse_node)
        .collect();

    let has_next = connection
        .pointer("/page_info/has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next_cursor = if has_next {
        json_str(connection, "/page_info/end_cursor").filter(|c| !c.is_empty())
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}

fn parse_node(node: &Value) -> Option<ContentItem> {
    let id = json_str(node, "/id")?;
    let url = json_str(node, "/shortcode").map(|code| format!("{BASE_URL}/p/{code}/"));
    let taken_at = node
        .pointer("/taken_at_timestamp")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Some(ContentItem {
        id,
        url,
        caption: json_str(node, "/edge_media_to_caption/edges/0/node/text").unwrap_or_default(),
        is_video: node
            .pointer("/is_video")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        like_count: json_u64(node, "/edge_liked_by/count")
            .max(json_u64(node, "/edge_media_preview_like/count")),
        comment_count: json_u64(node, "/edge_media_to_comment/count"),
        view_count: node.pointer("/video_view_count").and_then(Value::as_u64),
        display_url: json_str(node, "/display_url"),
        taken_at,
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
