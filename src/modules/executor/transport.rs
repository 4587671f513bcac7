//! reqwest-backed transport with a client-per-proxy pool.
//!
//! Each proxy endpoint gets its own `reqwest::Client` so connection pools
//! and TLS sessions never leak across egress identities. All clients share
//! one browser fingerprint; redirects are not followed because the executor
//! classifies them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::modules::fingerprint::ClientProfile;

use super::{HttpTransport, ScrapeRequest};

/// Upstream response reduced to what classification and the platform
/// parsers need.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    /// `Location` header, present on redirects.
    pub location: Option<String>,
    /// `Set-Cookie` pairs, name and value only.
    pub set_cookies: Vec<(String, String)>,
}

impl RawResponse {
    pub fn ok(body: Bytes) -> Self {
        Self {
            status: 200,
            body,
            location: None,
            set_cookies: Vec::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
            location: None,
            set_cookies: Vec::new(),
        }
    }
}

pub struct ReqwestTransport {
    profile: ClientProfile,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    /// The profile is fixed for the transport's lifetime; rotating
    /// fingerprints per request is itself a bot signal.
    pub fn new(profile: ClientProfile) -> Self {
        Self {
            profile,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client_for(&self, proxy: Option<&str>) -> Result<Client, String> {
        let key = proxy.map(str::to_string);
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut headers = HeaderMap::new();
        for (name, value) in self.profile.default_headers() {
            let name = HeaderName::from_static(name);
            let value = HeaderValue::from_static(value);
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(10));
        if let Some(endpoint) = proxy {
            let proxy = reqwest::Proxy::all(endpoint)
                .map_err(|e| format!("invalid proxy endpoint: {e}"))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| format!("client build failed: {e}"))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ScrapeRequest,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, String> {
        let client = self.client_for(proxy).await?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies = response
            .headers()
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_cookie_pair)
            .collect();
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(RawResponse {
            status,
            body,
            location,
            set_cookies,
        })
    }
}

/// Extract `name=value` from a `Set-Cookie` header, dropping attributes.
fn parse_cookie_pair(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
