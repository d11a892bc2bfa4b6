// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::cache::fetch_text;
use crate::diff::ReconciliationEvent;
use crate::errors::FetchError;
use crate::feature::{Feature, features_from_geojson};
use crate::layer::Layer;
use crate::render::LayerRenderer;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where complete feature snapshots come from.
pub trait FeatureSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Feature>, FetchError>>;
}

/// Polls a GeoJSON feature collection over HTTP.
pub struct HttpFeatureSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeatureSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl FeatureSource for HttpFeatureSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Feature>, FetchError>> {
        async move {
            let body = fetch_text(&self.client, &self.url).await?;
            features_from_geojson(&body)
        }
        .boxed()
    }
}

pub type EventSender = broadcast::Sender<Arc<ReconciliationEvent>>;

/// Drives one layer: fetch, apply, publish, then replay due popup refreshes.
pub struct Poller<R: LayerRenderer> {
    layer: Arc<Mutex<Layer<R>>>,
    source: Arc<dyn FeatureSource>,
    interval: Duration,
    events: EventSender,
}

impl<R: LayerRenderer> Poller<R> {
    pub fn new(layer: Arc<Mutex<Layer<R>>>, source: Arc<dyn FeatureSource>, interval: Duration) -> Self {
        // subscribers only care about the latest snapshots
        let (events, _) = broadcast::channel(16);

        Self {
            layer,
            source,
            interval,
            events,
        }
    }

    pub fn layer(&self) -> &Arc<Mutex<Layer<R>>> {
        &self.layer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ReconciliationEvent>> {
        self.events.subscribe()
    }

    /// One polling cycle. A failed fetch leaves the previous snapshot on the
    /// map and returns `None`.
    pub async fn poll_once(&self) -> Option<Arc<ReconciliationEvent>> {
        let features = match self.source.fetch().await {
            Ok(features) => features,
            Err(e) => {
                warn!("poll failed, keeping previous snapshot: {}", e);
                return None;
            }
        };

        let (event, due) = {
            let mut layer = self.layer.lock().await;
            let event = Arc::new(layer.apply(features));
            (event, layer.next_refresh_due())
        };

        // no receivers is fine
        let _ = self.events.send(event.clone());

        if let Some(due) = due {
            tokio::time::sleep_until(due).await;
            let refreshed = self.layer.lock().await.run_due_refreshes(Instant::now());
            debug!("replayed {} popup clicks", refreshed.len());
        }

        Some(event)
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("polling every {:?}", self.interval);

        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }
}
