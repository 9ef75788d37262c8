use flipbook::cli::{Args, Command};
use flipbook::core::apply::ApplyThread;
use flipbook::core::events::ViewEvent;
use flipbook::core::net::{HttpTransport, MemoryResponseCache};
use flipbook::core::view::ImageView;
use flipbook::entities::{
    Decoder, ImageDecoder, ImageViewConfig, MemorySurface, ResponseCache, SourceResolver, Transport,
};
use flipbook::paths::{self, PathConfig};
use flipbook::settings::EngineSettings;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("flipbook.log", path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("hyper_util", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("hyper_util", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn resolver_for(config_path: &Path) -> SourceResolver {
    match config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => SourceResolver::with_base_dir(dir),
        None => SourceResolver::new(),
    }
}

fn resolve(config_path: &Path) -> Result<()> {
    let config = ImageViewConfig::from_file(config_path)?;
    let resolver = resolver_for(config_path);

    let fields = [("images", &config.images), ("image", &config.image), ("defaultImage", &config.default_image)];
    for (name, value) in fields {
        let Some(value) = value else { continue };
        for (i, source) in resolver.resolve(value).iter().enumerate() {
            println!("{}[{}]  {:?}  {}", name, i, source.kind(), source.describe());
        }
    }
    println!(
        "frame duration: {:?}, repeat: {}, reverse: {}",
        config.frame_duration(),
        config.repeat_limit().map_or("infinite".to_string(), |n| n.to_string()),
        config.reverse
    );
    Ok(())
}

struct PlayOptions<'a> {
    ticks: Option<usize>,
    timeout: Duration,
    reverse: bool,
    out: Option<&'a Path>,
}

fn play(config_path: &Path, options: PlayOptions<'_>, settings: &EngineSettings) -> Result<()> {
    let mut config = ImageViewConfig::from_file(config_path)?;
    config.reverse |= options.reverse;
    if config.decode_retries.is_none() {
        config.decode_retries = Some(settings.default_decode_retries);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("flipbook-net")
        .build()
        .context("Failed to start network runtime")?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(settings)?);
    let cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new(settings.cache_entries));
    let decoder: Arc<dyn Decoder> = Arc::new(ImageDecoder::new().with_network(
        Arc::clone(&cache),
        Arc::clone(&transport),
        runtime.handle().clone(),
    ));

    let apply = Arc::new(ApplyThread::spawn()?);
    let surface = Arc::new(MemorySurface::new());
    let view = ImageView::builder(surface.clone(), decoder, apply)
        .resolver(resolver_for(config_path))
        .retry_delay(settings.retry_delay())
        .network(cache, transport, runtime.handle().clone())
        .build();

    let (tx, rx) = unbounded::<ViewEvent>();
    view.events().subscribe::<ViewEvent, _>(move |event| {
        let _ = tx.send(event.clone());
    });

    let animated = config.images.is_some();
    let limit = config.repeat_limit();
    view.apply_config(config);
    if animated && !view.start() {
        warn!("Nothing to play");
    }

    let deadline = Instant::now() + options.timeout;
    let mut changes = 0usize;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match rx.recv_timeout(remaining) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                info!("Timed out after {:?}", options.timeout);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        println!("{}  {:?}", event.name(), event);

        match event {
            ViewEvent::FrameChanged { .. } => {
                changes += 1;
                let done_ticks = options.ticks.is_some_and(|n| changes >= n);
                let done_limit = limit.is_some_and(|n| changes as u64 >= n);
                if done_ticks || done_limit {
                    break;
                }
            }
            ViewEvent::BitmapChanged { .. } if !animated => {
                // Placeholders come first; keep going while a fetch is pending.
                if view.current_token().is_none() {
                    break;
                }
            }
            _ => {}
        }
    }

    view.stop();
    debug!("Displayed {} frames, {} surface updates", changes, surface.updates());

    if let Some(out) = options.out {
        match view.to_blob()? {
            Some(blob) => {
                std::fs::write(out, &blob.data).with_context(|| format!("Failed to write {}", out.display()))?;
                println!("wrote {}x{} {} to {}", blob.width, blob.height, blob.mime_type, out.display());
            }
            None => warn!("Nothing displayed, {} not written", out.display()),
        }
    }
    view.release();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("Flipbook {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings = EngineSettings::load(&path_config).unwrap_or_else(|e| {
        warn!("{:#}, using default settings", e);
        EngineSettings::default()
    });

    match &args.command {
        Command::Resolve { config } => resolve(config),
        Command::Play {
            config,
            ticks,
            timeout,
            reverse,
            out,
        } => play(
            config,
            PlayOptions {
                ticks: *ticks,
                timeout: Duration::from_secs(*timeout),
                reverse: *reverse,
                out: out.as_deref(),
            },
            &settings,
        ),
    }
}
