//! Scholar HTTP session.
//!
//! One `reqwest` client is built at pipeline start and reused for every
//! Scholar fetch, with stored cookies attached to each request. Scraping
//! Scholar without a session cookie gets CAPTCHA-walled within a handful of
//! pages, so the cookie file is loaded up front and a dedicated error is
//! raised the moment a CAPTCHA page comes back.
//!
//! Politeness lives here too: a jittered sleep before author-profile fetches
//! and a fixed pause between list pages, mirroring human paging speed.

use crate::error::{CitemapError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Jittered delay before each author-profile fetch: 1-5 s
const PROFILE_DELAY_BASE_MS: u64 = 1000;
const PROFILE_DELAY_SPREAD_MS: u64 = 4000;

/// Fixed pause between list pages
const PAGE_DELAY: Duration = Duration::from_secs(2);

/// Default cookie file path: `~/.citemap_cookies.json`
fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".citemap_cookies.json"))
        .ok_or_else(|| CitemapError::Config("Cannot determine home directory".to_string()))
}

/// Cookie entry in browser-export format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub expires: Option<f64>,
}

/// Cookie manager for loading and saving cookies
pub struct CookieManager {
    path: PathBuf,
}

impl CookieManager {
    /// Create a new CookieManager with default path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    /// Create a new CookieManager with custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the cookie file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load cookies from file
    ///
    /// Returns empty vec if file doesn't exist or is invalid
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!("Cookie file not found: {:?}", self.path);
            return Vec::new();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Vec<Cookie>>(&content) {
                Ok(cookies) => {
                    info!("Loaded {} cookies from {:?}", cookies.len(), self.path);
                    cookies
                }
                Err(e) => {
                    warn!("Failed to parse cookies: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to read cookie file: {}", e);
                Vec::new()
            }
        }
    }

    /// Save cookies to file
    pub fn save(&self, cookies: &[Cookie]) -> Result<()> {
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        info!("Saved {} cookies to {:?}", cookies.len(), self.path);
        Ok(())
    }

    /// Clear stored cookies
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared cookies at {:?}", self.path);
        }
        Ok(())
    }
}

impl Default for CookieManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            path: PathBuf::from(".citemap_cookies.json"),
        })
    }
}

/// Session options supplied by the CLI
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Custom base URL for mirror sites
    pub base_url: Option<String>,
    /// Override for the cookie file location
    pub cookie_path: Option<PathBuf>,
}

/// The single Scholar session reused by every pipeline stage.
pub struct ScholarSession {
    client: reqwest::Client,
    cookie_header: String,
    base_url: String,
}

impl ScholarSession {
    /// Build the session: HTTP client, cookie header, base URL.
    pub fn new(options: &SessionOptions) -> Result<Self> {
        let base_url = options
            .base_url
            .as_ref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string());

        let manager = match &options.cookie_path {
            Some(path) => CookieManager::with_path(path.clone()),
            None => CookieManager::default(),
        };
        let cookies = manager.load();
        if cookies.is_empty() {
            warn!("No cookies loaded. Run 'citemap cookies path' and export cookies from your browser.");
        }
        let cookie_header = build_cookie_header(&cookies);

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .cookie_store(true);

        if let Some(proxy_url) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                CitemapError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| CitemapError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cookie_header,
            base_url,
        })
    }

    /// Base URL of the Scholar instance (mirror-aware).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a Scholar page and return its HTML.
    ///
    /// # Errors
    ///
    /// Returns `Captcha` when Scholar serves its anti-bot page, `RateLimited`
    /// on HTTP 429, `Api` on other non-success statuses.
    pub async fn fetch_html(&self, url: &Url) -> Result<String> {
        debug!(url = %url, "Fetching page");

        let mut request = self
            .client
            .get(url.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1");

        if !self.cookie_header.is_empty() {
            request = request.header("Cookie", self.cookie_header.as_str());
        }

        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CitemapError::RateLimited(60));
        }
        if !status.is_success() {
            return Err(CitemapError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {}", status),
            });
        }

        let html = response.text().await.map_err(CitemapError::Network)?;

        if html.contains("Solving the above CAPTCHA") || html.contains("unusual traffic") {
            warn!(url = %url, "CAPTCHA detected");
            return Err(CitemapError::Captcha);
        }

        Ok(html)
    }

    /// Jittered 1-5 s sleep before an author-profile fetch.
    pub async fn profile_pause(&self) {
        let delay = rand::random::<u64>() % PROFILE_DELAY_SPREAD_MS + PROFILE_DELAY_BASE_MS;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Fixed pause between list pages.
    pub async fn page_pause(&self) {
        tokio::time::sleep(PAGE_DELAY).await;
    }
}

/// Build cookie header string from cookie list
fn build_cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .filter(|c| c.domain.contains("google"))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_cookie_file() {
        let manager = CookieManager::with_path(PathBuf::from("/nonexistent/path"));
        assert!(manager.load().is_empty());
    }

    #[test]
    fn test_save_and_load_cookies() -> Result<()> {
        let temp = tempfile::NamedTempFile::new()?;
        let manager = CookieManager::with_path(temp.path().to_path_buf());

        let cookies = vec![Cookie {
            name: "NID".to_string(),
            value: "abc".to_string(),
            domain: ".google.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: false,
            expires: None,
        }];

        manager.save(&cookies)?;
        let loaded = manager.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "NID");
        Ok(())
    }

    #[test]
    fn test_cookie_header_filters_non_google_domains() {
        let cookies = vec![
            Cookie {
                name: "NID".to_string(),
                value: "abc".to_string(),
                domain: ".google.com".to_string(),
                path: String::new(),
                secure: false,
                http_only: false,
                expires: None,
            },
            Cookie {
                name: "other".to_string(),
                value: "x".to_string(),
                domain: ".example.com".to_string(),
                path: String::new(),
                secure: false,
                http_only: false,
                expires: None,
            },
        ];
        assert_eq!(build_cookie_header(&cookies), "NID=abc");
    }

    #[test]
    fn test_mirror_base_url_trimmed() -> Result<()> {
        let session = ScholarSession::new(&SessionOptions {
            base_url: Some("https://mirror.example.org/".to_string()),
            cookie_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            ..Default::default()
        })?;
        assert_eq!(session.base_url(), "https://mirror.example.org");
        Ok(())
    }
}
