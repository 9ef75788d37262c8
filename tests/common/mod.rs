#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, unbounded};
use flipbook::core::apply::ApplyThread;
use flipbook::core::events::ViewEvent;
use flipbook::core::net::MemoryResponseCache;
use flipbook::core::view::{ImageView, ImageViewBuilder};
use flipbook::entities::{
    Bitmap, Decoder, DisplaySurface, FetchFuture, FetchedResponse, ImageError, ImageSource, ImageValue, MemorySurface,
    ResponseCache, SizeHints,
};
use reqwest::Url;
use reqwest::header::{self, HeaderMap, HeaderValue};

/// Red channel tags every test bitmap.
pub fn tagged(tag: u8) -> Bitmap {
    Bitmap::solid(1, 1, [tag, 0, 0, 255])
}

pub fn frames(n: usize) -> ImageValue {
    ImageValue::List((0..n).map(|i| ImageValue::Bitmap(tagged(i as u8))).collect())
}

/// Inline bitmaps decode as themselves, `ok:<n>` files to `tagged(n)`,
/// blobs and cached URLs to `tagged(first byte)`. Everything else is a decode error.
pub struct StubDecoder {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub cache: Option<Arc<MemoryResponseCache>>,
}

impl StubDecoder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            cache: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::new() }
    }

    pub fn with_cache(cache: Arc<MemoryResponseCache>) -> Self {
        Self {
            cache: Some(cache),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for StubDecoder {
    fn decode(&self, source: &ImageSource, _hints: SizeHints) -> Result<Bitmap, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match source {
            ImageSource::InlineBitmap(b) => Ok(b.clone()),
            ImageSource::OpaqueBlob(body) if !body.is_empty() => Ok(tagged(body[0])),
            ImageSource::LocalFile(path) => path
                .to_string_lossy()
                .strip_prefix("ok:")
                .and_then(|n| n.parse().ok())
                .map(tagged)
                .ok_or_else(|| ImageError::Decode(format!("cannot decode {}", path.display()))),
            ImageSource::NetworkUrl(raw) => {
                let url = Url::parse(raw).map_err(|e| ImageError::InvalidSource(e.to_string()))?;
                self.cache
                    .as_ref()
                    .and_then(|c| c.lookup(&url))
                    .and_then(|body| body.first().copied())
                    .map(tagged)
                    .ok_or_else(|| ImageError::InvalidSource(format!("{} not cached", raw)))
            }
            _ => Err(ImageError::Decode("unsupported".into())),
        }
    }
}

/// Canned responses per URL: body and latency.
pub struct StubTransport {
    routes: HashMap<String, (Vec<u8>, Duration)>,
    pub no_store: bool,
    pub calls: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            no_store: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn route(mut self, url: &str, body: &[u8], delay: Duration) -> Self {
        self.routes.insert(url.to_string(), (body.to_vec(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl flipbook::entities::Transport for StubTransport {
    fn get(&self, url: &Url) -> FetchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let route = self.routes.get(url.as_str()).cloned();
        let mut headers = HeaderMap::new();
        if self.no_store {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
        let url = url.to_string();
        Box::pin(async move {
            let Some((body, delay)) = route else {
                return Err(ImageError::Network(format!("unexpected status 404 for {}", url)));
            };
            tokio::time::sleep(delay).await;
            Ok(FetchedResponse {
                headers,
                body: Bytes::from(body),
            })
        })
    }
}

pub struct Harness {
    pub view: ImageView,
    pub surface: Arc<MemorySurface>,
    pub decoder: Arc<StubDecoder>,
    pub events: Receiver<ViewEvent>,
}

impl Harness {
    pub fn new(decoder: StubDecoder) -> Self {
        Self::build(decoder, |b| b)
    }

    pub fn build(decoder: StubDecoder, configure: impl FnOnce(ImageViewBuilder) -> ImageViewBuilder) -> Self {
        let surface = Arc::new(MemorySurface::new());
        let decoder = Arc::new(decoder);
        let apply = Arc::new(ApplyThread::spawn().unwrap());
        let builder = ImageView::builder(surface.clone(), decoder.clone(), apply).retry_delay(Duration::from_millis(5));
        let view = configure(builder).build();

        let (tx, rx) = unbounded();
        view.events().subscribe::<ViewEvent, _>(move |e| {
            let _ = tx.send(e.clone());
        });
        Self {
            view,
            surface,
            decoder,
            events: rx,
        }
    }

    /// Red channel of the displayed bitmap.
    pub fn shown(&self) -> Option<u8> {
        self.surface.bitmap().and_then(|b| b.pixel(0, 0)).map(|p| p[0])
    }

    /// Everything received within `window`.
    pub fn collect(&self, window: Duration) -> Vec<ViewEvent> {
        let deadline = Instant::now() + window;
        let mut out = Vec::new();
        while let Ok(e) = self.events.recv_deadline(deadline) {
            out.push(e);
        }
        out
    }

    /// Receive until `n` frame changes arrived or `timeout` passed.
    pub fn changes(&self, n: usize, timeout: Duration) -> Vec<usize> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while out.len() < n {
            match self.events.recv_deadline(deadline) {
                Ok(ViewEvent::FrameChanged { index, .. }) => out.push(index),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        out
    }
}

pub fn indices(events: &[ViewEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ViewEvent::FrameChanged { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn names(events: &[ViewEvent]) -> Vec<&'static str> {
    events.iter().map(ViewEvent::name).collect()
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

pub fn shared_cache() -> Arc<MemoryResponseCache> {
    Arc::new(MemoryResponseCache::new(16))
}

pub fn as_cache(cache: &Arc<MemoryResponseCache>) -> Arc<dyn ResponseCache> {
    cache.clone()
}
