// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

// Juniper keeps one realtime layer in sync with its feed and logs every
// reconciliation, without a map attached.

use anyhow::Context;
use clap::Parser;
use layer_sync::cache::{FileBackend, KvCache, SessionBackend};
use layer_sync::config::{LayerSyncConfig, Theme};
use layer_sync::deeplink::{MemoryDeepLink, preselect};
use layer_sync::kinds::{LayerKind, strategy_for};
use layer_sync::layer::LayerControl;
use layer_sync::poller::{HttpFeatureSource, Poller};
use layer_sync::resolver::ResolveOptions;
use layer_sync::{LatLng, Layer, MapContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod headless;

use headless::{LogMap, LogPanel, LogRenderer};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON feature collection polled every interval
    #[arg(long, env = "LAYER_ENDPOINT")]
    endpoint: Option<String>,
    #[arg(long, env = "LAYER_KIND", default_value = "vehicles")]
    kind: LayerKind,
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 10_000)]
    interval_ms: u64,
    #[arg(long, env = "DETAIL_BASE_URL")]
    detail_base: Option<String>,
    #[arg(long, env = "MAP_THEME", default_value = "system")]
    theme: Theme,
    #[arg(long, env = "LAYER_CACHE_DIR", default_value = "data/layer_cache")]
    cache_dir: PathBuf,
    /// Keep the cache in memory only
    #[arg(long, default_value_t = false)]
    no_disk_cache: bool,
    /// Only redraw features whose content changed
    #[arg(long, default_value_t = false)]
    skip_unchanged: bool,
    /// Entity to select once the first snapshot arrives, e.g. `vehicles:1234`
    #[arg(long)]
    fragment: Option<String>,
}

impl Args {
    fn into_config(self) -> LayerSyncConfig {
        let defaults = LayerSyncConfig::default();

        LayerSyncConfig {
            endpoint: self.endpoint.unwrap_or(defaults.endpoint),
            kind: self.kind,
            poll_interval_ms: self.interval_ms,
            detail_base_url: self.detail_base.unwrap_or(defaults.detail_base_url),
            theme: self.theme,
            cache_dir: if self.no_disk_cache {
                None
            } else {
                Some(self.cache_dir)
            },
            skip_unchanged: self.skip_unchanged,
            initial_fragment: self.fragment,
            ..defaults
        }
    }
}

fn build_cache(config: &LayerSyncConfig) -> anyhow::Result<KvCache> {
    match &config.cache_dir {
        Some(dir) => {
            let persistent = FileBackend::new(dir)
                .with_context(|| format!("opening cache directory {}", dir.display()))?;
            Ok(KvCache::new(
                Arc::new(SessionBackend::new()),
                Arc::new(persistent),
            ))
        }
        None => Ok(KvCache::in_memory()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Args::parse().into_config();
    config.validate()?;

    info!(
        "juniper syncing {} layer from {}",
        config.kind, config.endpoint
    );

    let http = reqwest::ClientBuilder::new()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?;

    let deep_link = Arc::new(MemoryDeepLink::new(config.initial_fragment.clone()));
    let ctx = MapContext::new(
        Arc::new(LogMap::new(LatLng::new(34.0522, -118.2437), 11.0)),
        deep_link.clone(),
        Arc::new(LogPanel),
        build_cache(&config)?,
        http.clone(),
    );

    let layer = Layer::new(
        config.kind.as_str(),
        strategy_for(config.kind, &config.detail_base_url, config.theme),
        LogRenderer::default(),
        ctx,
        config.layer_options(),
    )?;
    let layer = Arc::new(tokio::sync::Mutex::new(layer));

    let poller = Poller::new(
        layer.clone(),
        Arc::new(HttpFeatureSource::new(http, config.endpoint.clone())),
        config.poll_interval(),
    );

    let mut events = poller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "{} cycle {}: {} features, {} updated, {} removed",
                    event.layer,
                    event.cycle,
                    event.features.len(),
                    event.update.len(),
                    event.removed_ids.len()
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event log fell behind by {} cycles", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if poller.poll_once().await.is_some() && config.initial_fragment.is_some() {
        let mut guard = layer.lock().await;
        let mut layers: [&mut dyn LayerControl; 1] = [&mut *guard];
        if let Some(resolution) = preselect(deep_link.as_ref(), &mut layers, &ResolveOptions::default())
        {
            info!("preselected {}", resolution.feature_id);
        }
    }

    poller.run().await;

    Ok(())
}
