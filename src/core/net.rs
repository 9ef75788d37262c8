//! Network collaborators: reqwest transport and an in-memory response cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use lru::LruCache;
use reqwest::Url;
use reqwest::header::{self, HeaderMap};

use crate::entities::{FetchFuture, FetchedResponse, ImageError, ResponseCache, Transport};
use crate::settings::EngineSettings;

const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// HTTP GET over a shared `reqwest::Client`. Futures must be driven by a tokio runtime.
pub struct HttpTransport {
    client: reqwest::Client,
    max_body_bytes: u64,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(settings: &EngineSettings) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.download_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ImageError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: settings.max_body_bytes,
            timeout_secs: settings.download_timeout_secs,
        })
    }

    fn map_reqwest_error(e: reqwest::Error, timeout_secs: u64) -> ImageError {
        if e.is_timeout() {
            ImageError::Timeout(format!("download exceeded {}s", timeout_secs))
        } else if e.is_connect() {
            ImageError::Network(format!("cannot connect: {}", e))
        } else {
            ImageError::Network(format!("request failed: {}", e))
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> FetchFuture {
        let client = self.client.clone();
        let url = url.clone();
        let limit = self.max_body_bytes;
        let timeout_secs = self.timeout_secs;

        Box::pin(async move {
            debug!("GET {}", url);
            let mut response = client
                .get(url.clone())
                .header(header::ACCEPT, ACCEPT_IMAGES)
                .send()
                .await
                .map_err(|e| Self::map_reqwest_error(e, timeout_secs))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ImageError::Network(format!("HTTP {} for {}", status.as_u16(), url)));
            }

            if let Some(len) = response.content_length()
                && len > limit
            {
                return Err(ImageError::ResourceLimit(format!(
                    "{} announces {} bytes (limit {})",
                    url, len, limit
                )));
            }

            let headers = response.headers().clone();
            let mut body = BytesMut::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| Self::map_reqwest_error(e, timeout_secs))?
            {
                if (body.len() + chunk.len()) as u64 > limit {
                    return Err(ImageError::ResourceLimit(format!("{} body exceeds {} bytes", url, limit)));
                }
                body.extend_from_slice(&chunk);
            }

            trace!("GET {} -> {} bytes", url, body.len());
            Ok(FetchedResponse {
                headers,
                body: body.freeze(),
            })
        })
    }
}

/// LRU response cache keyed by URL.
///
/// Admission follows the response headers: `Cache-Control: no-store` or
/// `private`, and `Pragma: no-cache`, keep a response out.
pub struct MemoryResponseCache {
    entries: Mutex<LruCache<String, Bytes>>,
}

impl MemoryResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Whether the headers allow storing this response.
    pub fn is_cacheable(headers: &HeaderMap) -> bool {
        let has_token = |name: header::HeaderName, tokens: &[&str]| {
            headers.get_all(name).iter().any(|value| {
                value.to_str().is_ok_and(|v| {
                    v.split(',')
                        .map(|d| d.trim().to_ascii_lowercase())
                        .any(|d| tokens.contains(&d.as_str()))
                })
            })
        };
        !has_token(header::CACHE_CONTROL, &["no-store", "private"])
            && !has_token(header::PRAGMA, &["no-cache"])
    }
}

impl ResponseCache for MemoryResponseCache {
    fn peek(&self, url: &Url) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url.as_str())
    }

    fn lookup(&self, url: &Url) -> Option<Bytes> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url.as_str())
            .cloned()
    }

    fn offer(&self, url: &Url, response: &FetchedResponse) -> bool {
        if response.body.is_empty() || !Self::is_cacheable(&response.headers) {
            debug!("Not caching {}", url);
            return false;
        }
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(url.to_string(), response.body.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(headers: &[(header::HeaderName, &'static str)], body: &'static [u8]) -> FetchedResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        FetchedResponse {
            headers: map,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_offer_and_lookup() {
        let cache = MemoryResponseCache::new(4);
        let url = Url::parse("http://x.test/a.png").unwrap();
        assert!(!cache.peek(&url));

        assert!(cache.offer(&url, &response(&[(header::CACHE_CONTROL, "max-age=60")], b"png")));
        assert!(cache.peek(&url));
        assert_eq!(cache.lookup(&url).as_deref(), Some(&b"png"[..]));
    }

    #[test]
    fn test_header_exclusions() {
        let cache = MemoryResponseCache::new(4);
        let url = Url::parse("http://x.test/a.png").unwrap();

        assert!(!cache.offer(&url, &response(&[(header::CACHE_CONTROL, "public, No-Store")], b"x")));
        assert!(!cache.offer(&url, &response(&[(header::CACHE_CONTROL, "private")], b"x")));
        assert!(!cache.offer(&url, &response(&[(header::PRAGMA, "no-cache")], b"x")));
        assert!(!cache.offer(&url, &response(&[], b"")));
        assert!(!cache.peek(&url));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryResponseCache::new(2);
        let urls: Vec<Url> = (0..3)
            .map(|i| Url::parse(&format!("http://x.test/{}.png", i)).unwrap())
            .collect();
        for url in &urls {
            cache.offer(url, &response(&[], b"data"));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.peek(&urls[0]));
        assert!(cache.peek(&urls[2]));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = MemoryResponseCache::new(0);
        let url = Url::parse("http://x.test/a.png").unwrap();
        assert!(cache.offer(&url, &response(&[], b"data")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_transport_builds_from_settings() {
        assert!(HttpTransport::new(&EngineSettings::default()).is_ok());
    }
}
