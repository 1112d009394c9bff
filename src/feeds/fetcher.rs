//! Page and feed fetcher with security measures.
//!
//! Fetches pages for feed discovery and feeds for import, with SSRF
//! protection and resource limits.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::config::PushConfig;
use crate::{BetafarmError, Result};

/// User agent string for outgoing requests.
pub const USER_AGENT: &str = "Betafarm/0.1 (PubSubHubbub subscriber)";

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// Value of the Content-Type header, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Source of remote documents.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the document at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Create a fetcher from the push configuration.
    pub fn new(config: &PushConfig) -> Result<Self> {
        let client = build_client(config)?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }
}

/// Build an HTTP client with the configured timeouts and redirect limit.
pub(crate) fn build_client(config: &PushConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
        .timeout(Duration::from_secs(config.total_timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BetafarmError::Config(format!("failed to create HTTP client: {}", e)))
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        if !self.allow_private_hosts {
            validate_url(url)?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BetafarmError::Fetch(format!("failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(BetafarmError::Fetch(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_body_bytes {
                return Err(BetafarmError::Fetch(format!(
                    "document too large: {} bytes (max {} bytes)",
                    content_length, self.max_body_bytes
                )));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BetafarmError::Fetch(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > self.max_body_bytes {
            return Err(BetafarmError::Fetch(format!(
                "document too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_body_bytes
            )));
        }

        Ok(FetchedPage {
            url: final_url,
            content_type,
            body: bytes.to_vec(),
        })
    }
}

/// Validate a URL for SSRF protection.
///
/// The URL must be http(s) and must not point at a private, loopback or
/// reserved host.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| BetafarmError::Validation(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(BetafarmError::Validation(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| BetafarmError::Validation("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(BetafarmError::Validation(format!("forbidden host: {}", domain)));
            }
            return Ok(());
        }
        url::Host::Ipv4(ipv4) => IpAddr::V4(ipv4),
        url::Host::Ipv6(ipv6) => IpAddr::V6(ipv6),
    };

    if is_private_ip(&ip) {
        return Err(BetafarmError::Validation(format!(
            "private IP address not allowed: {}",
            ip
        )));
    }

    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    if host == "localhost" {
        return true;
    }

    [".local", ".localhost", ".internal", ".intranet", ".lan"]
        .iter()
        .any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                // Shared address space: 100.64.0.0/10
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique local: fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local: fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
                || ipv6
                    .to_ipv4_mapped()
                    .map(|v4| is_private_ip(&IpAddr::V4(v4)))
                    .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_valid() {
        assert!(validate_url("https://blog.example.com/feed/").is_ok());
        assert!(validate_url("http://blog.example.com/").is_ok());
    }

    #[test]
    fn test_validate_url_invalid_scheme() {
        let result = validate_url("ftp://example.com/feed.xml");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unsupported URL scheme"));
    }

    #[test]
    fn test_validate_url_forbidden_hosts() {
        for url in [
            "http://localhost/feed",
            "http://server.local/feed",
            "http://api.internal/feed",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(err.to_string().contains("forbidden host"), "{url}");
        }
    }

    #[test]
    fn test_validate_url_private_ips() {
        for url in [
            "http://127.0.0.1/feed",
            "http://10.0.0.1/feed",
            "http://172.16.0.1/feed",
            "http://192.168.1.1/feed",
            "http://169.254.1.1/feed",
            "http://[::1]/feed",
            "http://[::ffff:127.0.0.1]/feed",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(err.to_string().contains("private IP"), "{url}");
        }

        assert!(validate_url("http://172.32.0.1/feed").is_ok());
        assert!(validate_url("http://93.184.216.34/feed").is_ok());
    }

    #[test]
    fn test_is_forbidden_hostname() {
        assert!(is_forbidden_hostname("LOCALHOST"));
        assert!(is_forbidden_hostname("router.lan"));
        assert!(!is_forbidden_hostname("localhost.example.com"));
        assert!(!is_forbidden_hostname("news.ycombinator.com"));
    }

    #[test]
    fn test_fetched_page_text() {
        let page = FetchedPage::new("http://blog.example/", Some("text/html"), b"<p>hi</p>".to_vec());
        assert_eq!(page.text(), "<p>hi</p>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_http_fetcher_refuses_private_hosts() {
        let fetcher = HttpFetcher::new(&PushConfig::default()).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:9/feed").await;
        assert!(matches!(result, Err(BetafarmError::Validation(_))));
    }
}
