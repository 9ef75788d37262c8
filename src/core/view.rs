//! ImageView: one image widget's engine.
//!
//! Two modes, picked by configuration:
//! - `image` (or legacy `url`): one source, resolved through the fetcher and the
//!   retry controller, guarded by the view's request token
//! - `images`: a frame sequence, prebuffered as soon as it is configured and
//!   played by the playback controller on `start()`
//!
//! `images` wins over `image`. Every surface update and notification goes
//! through the apply thread.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, trace, warn};
use uuid::Uuid;

use super::apply::ApplyThread;
use super::event_bus::EventBus;
use super::fetcher::AsyncFetcher;
use super::frame_loader::PlaybackParams;
use super::playback::{PlaybackController, PlaybackState};
use super::publisher::Publisher;
use super::retry::{DEFAULT_RETRY_DELAY, RetryController, RetryDecision};
use super::token::{RequestToken, TokenGuard};
use crate::entities::resolver::is_network_url;
use crate::entities::{
    Bitmap, Decoder, DisplaySurface, ImageBlob, ImageError, ImageSource, ImageValue, ImageViewConfig,
    Property, ResponseCache, SizeHints, SourceResolver, Transport,
};

pub struct ImageViewBuilder {
    surface: Arc<dyn DisplaySurface>,
    decoder: Arc<dyn Decoder>,
    apply: Arc<ApplyThread>,
    bus: EventBus,
    resolver: SourceResolver,
    retry_delay: Duration,
    network: Option<(Arc<dyn ResponseCache>, Arc<dyn Transport>, tokio::runtime::Handle)>,
}

impl ImageViewBuilder {
    pub fn events(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn resolver(mut self, resolver: SourceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enable async network fetches through `transport`, driven on `runtime`.
    pub fn network(
        mut self,
        cache: Arc<dyn ResponseCache>,
        transport: Arc<dyn Transport>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        self.network = Some((cache, transport, runtime));
        self
    }

    pub fn build(self) -> ImageView {
        let id = Uuid::new_v4();
        let tokens = Arc::new(TokenGuard::new());
        let mut fetcher = AsyncFetcher::new(Arc::clone(&self.decoder), Arc::clone(&self.apply), Arc::clone(&tokens));
        if let Some((cache, transport, runtime)) = self.network {
            fetcher = fetcher.with_network(cache, transport, runtime);
        }
        let retry = Arc::new(RetryController::new(Arc::clone(&self.apply), self.retry_delay));
        let publisher = Arc::new(Publisher::new(id, self.surface, self.apply, self.bus));
        debug!("ImageView {} created", id);

        ImageView {
            shared: Arc::new(Shared {
                publisher,
                decoder: self.decoder,
                tokens,
                fetcher,
                retry,
                resolver: self.resolver,
                playback: PlaybackController::new(),
                state: Mutex::new(ViewState::default()),
            }),
        }
    }
}

#[derive(Default)]
struct ViewState {
    config: ImageViewConfig,
    sources: Arc<Vec<ImageSource>>,
    /// Sources came from `images`.
    multi: bool,
    default_source: Option<ImageSource>,
    released: bool,
}

struct Shared {
    publisher: Arc<Publisher>,
    decoder: Arc<dyn Decoder>,
    tokens: Arc<TokenGuard>,
    fetcher: AsyncFetcher,
    retry: Arc<RetryController>,
    resolver: SourceResolver,
    playback: PlaybackController,
    state: Mutex<ViewState>,
}

/// What `render_single` reads from the view state.
struct SingleSnapshot {
    source: Option<ImageSource>,
    default_source: Option<ImageSource>,
    hints: SizeHints,
    max_attempts: u32,
}

pub struct ImageView {
    shared: Arc<Shared>,
}

impl ImageView {
    pub fn builder(
        surface: Arc<dyn DisplaySurface>,
        decoder: Arc<dyn Decoder>,
        apply: Arc<ApplyThread>,
    ) -> ImageViewBuilder {
        ImageViewBuilder {
            surface,
            decoder,
            apply,
            bus: EventBus::new(),
            resolver: SourceResolver::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
            network: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.publisher.view()
    }

    /// Notifications (`ViewEvent`), emitted on the apply thread.
    pub fn events(&self) -> &EventBus {
        self.shared.publisher.bus()
    }

    pub fn config(&self) -> ImageViewConfig {
        self.shared.lock().config.clone()
    }

    pub fn sources(&self) -> Arc<Vec<ImageSource>> {
        Arc::clone(&self.shared.lock().sources)
    }

    pub fn default_source(&self) -> Option<ImageSource> {
        self.shared.lock().default_source.clone()
    }

    pub fn current_token(&self) -> Option<RequestToken> {
        self.shared.tokens.current()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.playback.state()
    }

    /// Full configuration, as given at construction.
    pub fn apply_config(&self, mut config: ImageViewConfig) {
        config.normalize();
        let shared = &self.shared;

        let images = config.images.clone();
        let image = config.image.clone();
        let default_image = config.default_image.clone();
        {
            let mut st = shared.lock();
            if st.released {
                warn!("apply_config on a released view ignored");
                return;
            }
            // Source fields are handled below so change detection still sees the old ones.
            let previous = std::mem::replace(&mut st.config, config);
            st.config.image = previous.image;
            st.config.images = previous.images;

            if let Some(default) = &default_image {
                let adopt = match &image {
                    None => true,
                    Some(ImageValue::Text(text)) if is_network_url(text) => !shared.fetcher.is_cached(text),
                    Some(_) => false,
                };
                if adopt {
                    st.default_source = Some(shared.resolver.resolve_one(default));
                }
            }
        }

        if images.is_some() {
            shared.set_images(images);
            return;
        }
        if shared.lock().multi {
            shared.set_images(None);
        }
        shared.set_image(image);
    }

    /// Single-key update.
    pub fn set_property(&self, property: Property) {
        trace!("ImageView {} property {}", self.id(), property.key());
        let shared = &self.shared;
        match property {
            Property::Url(value) => {
                warn!("The url property is deprecated, use image instead");
                shared.set_image(value);
            }
            Property::Image(value) => shared.set_image(value),
            Property::Images(value) => shared.set_images(value),
            Property::DefaultImage(value) => shared.set_default_image(value),
            other => {
                let mut st = shared.lock();
                if !st.released {
                    st.config.set(other);
                }
            }
        }
    }

    /// New layout size: update hints and re-resolve the single image.
    pub fn size_changed(&self, width: u32, height: u32) {
        {
            let mut st = self.shared.lock();
            st.config.width = Some(width);
            st.config.height = Some(height);
        }
        self.shared.render_single();
    }

    pub fn start(&self) -> bool {
        self.shared.start()
    }

    pub fn pause(&self) {
        self.shared.playback.pause();
    }

    pub fn resume(&self) {
        self.shared.playback.resume();
    }

    pub fn stop(&self) {
        self.shared.playback.stop(&self.shared.publisher);
    }

    pub fn is_animating(&self) -> bool {
        self.shared.playback.is_animating()
    }

    /// Direction actually playing, or the configured one when stopped.
    pub fn is_reverse(&self) -> bool {
        let configured = self.shared.lock().config.reverse;
        self.shared.playback.session_reverse().unwrap_or(configured)
    }

    /// Direction for the next `start()`.
    pub fn set_reverse(&self, reverse: bool) {
        self.shared.lock().config.reverse = reverse;
    }

    pub fn current_bitmap(&self) -> Option<Bitmap> {
        self.shared.publisher.snapshot()
    }

    /// PNG snapshot of what is displayed now.
    pub fn to_blob(&self) -> Result<Option<ImageBlob>, ImageError> {
        self.current_bitmap().map(|b| ImageBlob::from_bitmap(&b)).transpose()
    }

    /// Tear down playback and forget all sources; later completions are no-ops.
    pub fn release(&self) {
        let shared = &self.shared;
        shared.playback.teardown(PlaybackState::Stopped);
        shared.tokens.invalidate();
        shared.retry.reset();
        let mut st = shared.lock();
        st.sources = Arc::new(Vec::new());
        st.multi = false;
        st.default_source = None;
        st.released = true;
        debug!("ImageView {} released", shared.publisher.view());
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_image(self: &Arc<Self>, value: Option<ImageValue>) {
        let default_source = {
            let mut st = self.lock();
            if st.released {
                return;
            }
            if st.multi {
                debug!("image ignored, images is configured");
                return;
            }
            st.config.image = value.clone();

            match &value {
                Some(value) => {
                    let source = self.resolver.resolve_one(value);
                    if st.sources.len() == 1 && st.sources[0] == source {
                        trace!("Same source, nothing to do");
                        return;
                    }
                    st.sources = Arc::new(vec![source]);
                    None
                }
                None => {
                    st.sources = Arc::new(Vec::new());
                    Some(st.default_source.clone())
                }
            }
        };

        self.retry.reset();
        match default_source {
            // Cleared: back to the default image (or nothing).
            Some(default_source) => {
                self.tokens.invalidate();
                let hints = self.lock().config.size_hints();
                self.show_default(default_source, hints);
            }
            None => self.render_single(),
        }
    }

    fn set_images(self: &Arc<Self>, value: Option<ImageValue>) {
        let was_active = matches!(self.playback.state(), PlaybackState::Playing | PlaybackState::Paused);
        let default_source = {
            let mut st = self.lock();
            if st.released {
                return;
            }
            st.config.images = value.clone();
            match &value {
                Some(images) => {
                    st.sources = Arc::new(self.resolver.resolve(images));
                    st.multi = true;
                }
                None => {
                    st.sources = Arc::new(Vec::new());
                    st.multi = false;
                }
            }
            st.default_source.clone()
        };
        self.tokens.invalidate();
        self.retry.reset();

        // Fires `stop` only if the old list was playing.
        self.playback.stop(&self.publisher);
        match value {
            Some(_) => {
                if let Some(params) = self.playback_params() {
                    self.playback.prebuffer(params, Arc::clone(&self.decoder), &self.publisher);
                }
                if was_active {
                    debug!("images changed during playback, restarting");
                    self.start();
                }
            }
            None => {
                let hints = self.lock().config.size_hints();
                self.show_default(default_source, hints);
            }
        }
    }

    fn set_default_image(self: &Arc<Self>, value: Option<ImageValue>) {
        let show = {
            let mut st = self.lock();
            if st.released {
                return;
            }
            st.config.default_image = value.clone();
            st.default_source = value.as_ref().map(|v| self.resolver.resolve_one(v));
            st.sources.is_empty().then(|| (st.default_source.clone(), st.config.size_hints()))
        };
        if let Some((default_source, hints)) = show {
            self.show_default(default_source, hints);
        }
    }

    fn playback_params(&self) -> Option<PlaybackParams> {
        let st = self.lock();
        if st.released || !st.multi {
            return None;
        }
        Some(PlaybackParams {
            sources: Arc::clone(&st.sources),
            frame_duration: st.config.frame_duration(),
            repeat_limit: st.config.repeat_limit(),
            reverse: st.config.reverse,
            hints: st.config.size_hints(),
        })
    }

    fn start(self: &Arc<Self>) -> bool {
        let Some(params) = self.playback_params() else {
            debug!("start() ignored, no images configured");
            return false;
        };
        self.playback.start(params, Arc::clone(&self.decoder), &self.publisher)
    }

    fn snapshot_single(&self) -> Option<SingleSnapshot> {
        let st = self.lock();
        if st.released || st.multi {
            return None;
        }
        Some(SingleSnapshot {
            source: st.sources.first().cloned(),
            default_source: st.default_source.clone(),
            hints: st.config.size_hints(),
            max_attempts: st.config.max_decode_retries(),
        })
    }

    /// Resolve and display the single configured source.
    fn render_single(self: &Arc<Self>) {
        let Some(snapshot) = self.snapshot_single() else {
            return;
        };
        let Some(source) = snapshot.source else {
            self.tokens.invalidate();
            self.publisher.show(None);
            return;
        };

        if !source.is_network_url() {
            self.tokens.invalidate();
            let publisher = Arc::clone(&self.publisher);
            self.retry.decode_with_retry(
                Arc::clone(&self.decoder),
                source,
                snapshot.hints,
                snapshot.max_attempts,
                move |bitmap| {
                    publisher.show(Some(bitmap));
                },
            );
            return;
        }

        // Token first, so the placeholder is already shown as pending.
        let token = self.tokens.issue();
        self.show_default(snapshot.default_source, snapshot.hints);

        let weak: Weak<Shared> = Arc::downgrade(self);
        let label = source.describe();
        let max_attempts = snapshot.max_attempts;
        let path = self.fetcher.fetch_async(
            &source,
            snapshot.hints,
            token,
            Box::new(move |token: RequestToken, result: Result<Bitmap, ImageError>| {
                if let Some(shared) = weak.upgrade() {
                    shared.complete(token, &label, result, max_attempts);
                }
            }),
        );
        trace!("Fetch {} for {} via {:?}", token, source.describe(), path);
    }

    fn complete(self: &Arc<Self>, token: RequestToken, label: &str, result: Result<Bitmap, ImageError>, max_attempts: u32) {
        match result {
            Ok(bitmap) => {
                if !self.publisher.show_if_current(&self.tokens, token, bitmap) {
                    trace!("Result for {} arrived after a newer request", label);
                }
            }
            Err(err) => {
                if !self.tokens.is_current(token) {
                    return;
                }
                let weak = Arc::downgrade(self);
                let decision = self.retry.on_failure(label, &err, max_attempts, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.render_single();
                    }
                });
                // Given up: the request is over, the placeholder stays.
                if !matches!(decision, RetryDecision::Scheduled(_)) {
                    self.tokens.apply_if_current(token, || ());
                }
            }
        }
    }

    fn show_default(&self, default_source: Option<ImageSource>, hints: SizeHints) {
        let bitmap = default_source.and_then(|source| match self.decoder.decode(&source, hints) {
            Ok(bitmap) => Some(bitmap),
            Err(e) => {
                warn!("Default image {} failed: {}", source.describe(), e);
                None
            }
        });
        self.publisher.show(bitmap);
    }
}
