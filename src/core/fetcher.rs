//! AsyncFetcher: cache-aware fetch-and-decode for a single source.
//!
//! Paths, decided up front:
//! - non-network source, malformed URL, or no network backend: decode on the
//!   caller's thread and complete inline (`FetchPath::Immediate`)
//! - URL already in the response cache: same, decoder reads the cache (`Cached`)
//! - otherwise: download on the tokio runtime, offer the response to the cache,
//!   decode on a blocking task, complete on the apply thread (`Async`)
//!
//! If the cache did not take the response, the request is reissued under a new
//! token and fetched again directly. Async completions are dropped unless their
//! token is still current when they reach the apply thread.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, trace, warn};
use reqwest::Url;

use super::apply::ApplyThread;
use super::token::{RequestToken, TokenGuard};
use crate::entities::{Bitmap, Decoder, ImageError, ImageSource, ResponseCache, SizeHints, Transport};

/// Completion callback: the token the result belongs to, and the result.
pub type Completion = Box<dyn FnOnce(RequestToken, Result<Bitmap, ImageError>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPath {
    Immediate,
    Cached,
    Async,
}

#[derive(Clone)]
struct Backend {
    cache: Arc<dyn ResponseCache>,
    transport: Arc<dyn Transport>,
    runtime: tokio::runtime::Handle,
}

pub struct AsyncFetcher {
    decoder: Arc<dyn Decoder>,
    apply: Arc<ApplyThread>,
    tokens: Arc<TokenGuard>,
    backend: Option<Backend>,
}

impl AsyncFetcher {
    pub fn new(decoder: Arc<dyn Decoder>, apply: Arc<ApplyThread>, tokens: Arc<TokenGuard>) -> Self {
        Self {
            decoder,
            apply,
            tokens,
            backend: None,
        }
    }

    pub fn with_network(
        mut self,
        cache: Arc<dyn ResponseCache>,
        transport: Arc<dyn Transport>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        self.backend = Some(Backend {
            cache,
            transport,
            runtime,
        });
        self
    }

    /// Whether `raw` parses and is already in the response cache.
    pub fn is_cached(&self, raw: &str) -> bool {
        match (&self.backend, Url::parse(raw)) {
            (Some(backend), Ok(url)) => backend.cache.peek(&url),
            _ => false,
        }
    }

    pub fn fetch_async(
        &self,
        source: &ImageSource,
        hints: SizeHints,
        token: RequestToken,
        on_complete: Completion,
    ) -> FetchPath {
        let ImageSource::NetworkUrl(raw) = source else {
            on_complete(token, self.decoder.decode(source, hints));
            return FetchPath::Immediate;
        };

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                error!("Malformed URL {}: {}", raw, e);
                on_complete(token, self.decoder.decode(source, hints));
                return FetchPath::Immediate;
            }
        };

        let Some(backend) = self.backend.clone() else {
            debug!("No network backend, decoding {} synchronously", url);
            on_complete(token, self.decoder.decode(source, hints));
            return FetchPath::Immediate;
        };

        if backend.cache.peek(&url) {
            trace!("Cache hit for {}", url);
            on_complete(token, self.decoder.decode(source, hints));
            return FetchPath::Cached;
        }

        let decoder = Arc::clone(&self.decoder);
        let apply = Arc::clone(&self.apply);
        let tokens = Arc::clone(&self.tokens);
        let runtime = backend.runtime.clone();
        runtime.spawn(async move {
            let (token, result) = download(&backend, &decoder, &tokens, url, hints, token).await;
            let delivered = apply.post(move || {
                if tokens.is_current(token) {
                    on_complete(token, result);
                } else {
                    trace!("Dropping completion for superseded request {}", token);
                }
            });
            if !delivered {
                debug!("Apply thread gone, completion for {} dropped", token);
            }
        });
        FetchPath::Async
    }
}

async fn download(
    backend: &Backend,
    decoder: &Arc<dyn Decoder>,
    tokens: &TokenGuard,
    url: Url,
    hints: SizeHints,
    token: RequestToken,
) -> (RequestToken, Result<Bitmap, ImageError>) {
    let response = match backend.transport.get(&url).await {
        Ok(response) => response,
        Err(e) => return (token, Err(e)),
    };

    if backend.cache.offer(&url, &response) && backend.cache.peek(&url) {
        debug!("Downloaded {} ({} bytes)", url, response.body.len());
        return (token, decode_body(decoder, response.body, hints).await);
    }

    warn!("Response cache rejected {}, fetching it directly", url);
    let Some(token) = tokens.reissue(token) else {
        return (token, Err(ImageError::Cancelled(format!("{} superseded", url))));
    };
    let result = match backend.transport.get(&url).await {
        Ok(direct) => decode_body(decoder, direct.body, hints).await,
        Err(e) => Err(e),
    };
    (token, result)
}

async fn decode_body(decoder: &Arc<dyn Decoder>, body: Bytes, hints: SizeHints) -> Result<Bitmap, ImageError> {
    let decoder = Arc::clone(decoder);
    match tokio::task::spawn_blocking(move || decoder.decode(&ImageSource::OpaqueBlob(body), hints)).await {
        Ok(result) => result,
        Err(e) => Err(ImageError::Decode(format!("decode task failed: {}", e))),
    }
}
