use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::validation::validate_resolved_host;

/// Maximum upstream response body size (10 MB).
pub const MAX_RESPONSE_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Upstream payload as embedded in a `successful` response.
///
/// Serializes untagged: JSON bodies inline, images as `{ "image_url": .. }`
/// pointing at the gate's URL, everything else as a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpstreamBody {
    Json(serde_json::Value),
    Image { image_url: String },
    Text(String),
}

impl UpstreamBody {
    /// Classify a fetched body by its content-type.
    ///
    /// Bodies labelled JSON that fail to parse are kept as text.
    pub fn classify(content_type: &str, body: &[u8], api_url: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("application/json") {
            match serde_json::from_slice(body) {
                Ok(value) => return UpstreamBody::Json(value),
                Err(e) => {
                    tracing::debug!(error = %e, "upstream declared JSON but body did not parse");
                }
            }
        } else if ct.starts_with("image/") {
            return UpstreamBody::Image {
                image_url: api_url.to_string(),
            };
        }
        UpstreamBody::Text(String::from_utf8_lossy(body).into_owned())
    }
}

/// Result of fetching a gate's upstream. Non-2xx statuses are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: String,
    pub body: UpstreamBody,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// HTTP client for paid-for upstream resources.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
    guard_private: bool,
}

fn build_http(timeout: Duration, pinned: Option<(&str, SocketAddr)>) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none()); // no SSRF via redirects
    if let Some((host, addr)) = pinned {
        builder = builder.resolve(host, addr);
    }
    builder.build()
}

impl UpstreamClient {
    /// Build a client with a request `timeout`. With `guard_private` set,
    /// hosts resolving to private or loopback addresses are refused.
    pub fn new(timeout: Duration, guard_private: bool) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http(timeout, None)?,
            timeout,
            guard_private,
        })
    }

    /// Client whose DNS for `host` is fixed to `addr`, so the connection
    /// goes to the address that passed the private-range check. TLS still
    /// verifies against `host`.
    fn pinned(&self, host: &str, addr: SocketAddr) -> Result<reqwest::Client, String> {
        build_http(self.timeout, Some((host, addr))).map_err(|e| e.to_string())
    }

    /// GET `url` and classify the body. Errors are transport-level only.
    pub async fn fetch(&self, url: &str) -> Result<UpstreamResponse, String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid upstream URL: {e}"))?;

        if !self.guard_private {
            return self.send(&self.http, parsed, url).await;
        }

        let port = parsed.port_or_known_default().unwrap_or(443);
        match parsed.host() {
            Some(url::Host::Domain(domain)) => {
                let domain = domain.to_string();
                let addr = validate_resolved_host(&domain, port).await?;
                tracing::debug!(host = %domain, %addr, "pinned upstream address");
                let http = self.pinned(&domain, addr)?;
                self.send(&http, parsed, url).await
            }
            Some(host) => {
                // IP literals need no lookup, so there is nothing to rebind.
                validate_resolved_host(&host.to_string(), port).await?;
                self.send(&self.http, parsed, url).await
            }
            None => Err("upstream URL has no host".to_string()),
        }
    }

    async fn send(
        &self,
        http: &reqwest::Client,
        target: url::Url,
        api_url: &str,
    ) -> Result<UpstreamResponse, String> {
        let started = Instant::now();
        let mut response = http.get(target).send().await.map_err(|e| {
            tracing::warn!(error = %e, "upstream request failed");
            e.to_string()
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if let Some(cl) = response.content_length() {
            if cl > MAX_RESPONSE_BODY_SIZE as u64 {
                return Err(format!(
                    "upstream response too large: {cl} bytes (max {MAX_RESPONSE_BODY_SIZE})"
                ));
            }
        }

        // Enforce the cap while streaming; chunked bodies carry no length.
        let mut body = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(MAX_RESPONSE_BODY_SIZE),
        );
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to read upstream body");
            e.to_string()
        })? {
            if body.len() + chunk.len() > MAX_RESPONSE_BODY_SIZE {
                return Err(format!(
                    "upstream response too large (max {MAX_RESPONSE_BODY_SIZE} bytes)"
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse {
            status,
            body: UpstreamBody::classify(&content_type, &body, api_url),
            content_type,
            elapsed: started.elapsed(),
        })
    }
}
