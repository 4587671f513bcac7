//! Inbound HTTP surface.
//!
//! Thin axum layer over the two per-platform orchestrators. The bearer
//! credential is checked before any network egress; scrape outcomes are
//! always HTTP 200 with the result document (including `failed` ones), so
//! 4xx is reserved for caller-side contract violations.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::ScraperConfig;
use crate::orchestrator::{build_instagram, build_tiktok, ScrapeOrchestrator};
use crate::types::ScrapeOptions;

pub struct AppState {
    api_key: String,
    instagram: ScrapeOrchestrator,
    tiktok: ScrapeOrchestrator,
    health: HealthSnapshot,
}

/// Configuration presence, captured once at startup. Reports whether
/// credentials are configured, not whether they currently work.
struct HealthSnapshot {
    instagram_datacenter_configured: bool,
    instagram_residential_configured: bool,
    instagram_query_ids_configured: bool,
    tiktok_residential_configured: bool,
}

impl AppState {
    pub fn new(config: &ScraperConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("no api key configured, inbound auth is disabled");
        }
        Self {
            api_key: config.api_key.clone(),
            instagram: build_instagram(config),
            tiktok: build_tiktok(config),
            health: HealthSnapshot {
                instagram_datacenter_configured: !config.instagram.datacenter_proxies.is_empty(),
                instagram_residential_configured: !config.instagram.residential_proxies.is_empty(),
                instagram_query_ids_configured: !config.instagram_queries.timeline_doc_id.is_empty()
                    && !config.instagram_queries.reels_doc_id.is_empty(),
                tiktok_residential_configured: !config.tiktok.residential_proxies.is_empty(),
            },
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/scrape/instagram", post(scrape_instagram))
        .route("/scrape/tiktok", post(scrape_tiktok))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Scrape trigger body. The legacy field names of the pipeline consumer are
/// accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBody {
    #[serde(alias = "username")]
    subject_identifier: String,
    #[serde(default = "default_max_items", alias = "maxPosts")]
    max_items: usize,
    #[serde(
        default = "default_include_secondary",
        alias = "includeReels",
        rename = "includeSecondaryContentType"
    )]
    include_secondary: bool,
}

fn default_max_items() -> usize {
    10
}

fn default_include_secondary() -> bool {
    true
}

impl ScrapeBody {
    fn options(&self) -> ScrapeOptions {
        ScrapeOptions {
            max_items: self.max_items,
            include_secondary: self.include_secondary,
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if state.api_key.is_empty() {
        return Ok(());
    }
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(state.api_key.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing bearer credential"})),
        )
            .into_response())
    }
}

async fn scrape_instagram(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScrapeBody>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let result = state
        .instagram
        .scrape_profile(&body.subject_identifier, body.options())
        .await;
    Json(result).into_response()
}

async fn scrape_tiktok(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScrapeBody>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let result = state
        .tiktok
        .scrape_profile(&body.subject_identifier, body.options())
        .await;
    Json(result).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let instagram_pool = state.instagram.pool_health();
    let tiktok_pool = state.tiktok.pool_health();
    Json(json!({
        "status": "ok",
        "apiKeyConfigured": !state.api_key.is_empty(),
        "instagram": {
            "datacenterProxiesConfigured": state.health.instagram_datacenter_configured,
            "residentialProxiesConfigured": state.health.instagram_residential_configured,
            "queryIdsConfigured": state.health.instagram_query_ids_configured,
            "datacenterAvailable": instagram_pool.datacenter_available,
            "residentialAvailable": instagram_pool.residential_available,
        },
        "tiktok": {
            "residentialProxiesConfigured": state.health.tiktok_residential_configured,
            "residentialAvailable": tiktok_pool.residential_available,
        },
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_key(key: &str) -> AppState {
        let config = ScraperConfig {
            api_key: key.to_string(),
            ..ScraperConfig::default()
        };
        AppState::new(&config)
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {value}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn missing_credential_is_rejected() {
        let state = state_with_key("secret");
        assert!(authorize(&state, &HeaderMap::new()).is_err());
    }

    #[test]
    fn wrong_credential_is_rejected() {
        let state = state_with_key("secret");
        assert!(authorize(&state, &bearer("not-it")).is_err());
    }

    #[test]
    fn matching_credential_passes() {
        let state = state_with_key("secret");
        assert!(authorize(&state, &bearer("secret")).is_ok());
    }

    #[test]
    fn body_accepts_legacy_field_names() {
        let body: ScrapeBody = serde_json::from_str(
            r#"{"username": "atlas", "maxPosts": 25, "includeReels": false}"#,
        )
        .unwrap();
        assert_eq!(body.subject_identifier, "atlas");
        assert_eq!(body.max_items, 25);
        assert!(!body.include_secondary);
    }

    #[test]
    fn body_defaults_apply() {
        let body: ScrapeBody =
            serde_json::from_str(r#"{"subjectIdentifier": "atlas"}"#).unwrap();
        assert_eq!(body.max_items, 10);
        assert!(body.include_secondary);
    }
}
