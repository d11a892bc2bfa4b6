// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! What differs between vehicles, stops, shapes and facilities: popup
//! content, marker style, click context and where the sidebar detail comes
//! from. The reconciliation pipeline itself is shared.

use crate::cache::{BackendKind, FetchOptions, Payload};
use crate::click::ClickContext;
use crate::config::Theme;
use crate::errors::ConfigError;
use crate::feature::{Feature, Properties};
use crate::render::{MarkerStyle, PopupContent};
use crate::sidebar::{DetailFetcher, DetailLoad, DetailSource};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Vehicles,
    Stops,
    Shapes,
    Facilities,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Vehicles => "vehicles",
            LayerKind::Stops => "stops",
            LayerKind::Shapes => "shapes",
            LayerKind::Facilities => "facilities",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vehicles" | "vehicle" => Ok(LayerKind::Vehicles),
            "stops" | "stop" => Ok(LayerKind::Stops),
            "shapes" | "shape" | "routes" | "route" => Ok(LayerKind::Shapes),
            "facilities" | "facility" => Ok(LayerKind::Facilities),
            _ => Err(ConfigError::InvalidLayerKind(s.to_string())),
        }
    }
}

/// Per-kind behaviour plugged into a [`crate::Layer`].
pub trait LayerStrategy: Send + Sync {
    fn kind(&self) -> LayerKind;

    /// Property used as the public identifier of an entity.
    fn id_field(&self) -> &str;

    fn popup(&self, feature: &Feature) -> PopupContent;

    fn style(&self, feature: &Feature) -> MarkerStyle;

    fn click_context(&self, feature: &Feature) -> ClickContext {
        ClickContext::new(&feature.id, feature.properties.clone(), self.id_field())
    }

    fn detail_source(&self) -> Arc<dyn DetailSource>;

    /// Properties matched by text search.
    fn search_fields(&self) -> &[&'static str];

    /// Human readable name used in search results.
    fn label(&self, feature: &Feature) -> String {
        self.popup(feature).title
    }
}

/// Builds the strategy for a configured layer kind.
pub fn strategy_for(kind: LayerKind, detail_base_url: &str, theme: Theme) -> Arc<dyn LayerStrategy> {
    let base = detail_base_url.trim_end_matches('/').to_string();
    match kind {
        LayerKind::Vehicles => Arc::new(VehicleStrategy::new(base)),
        LayerKind::Stops => Arc::new(StopStrategy::new(base, theme)),
        LayerKind::Shapes => Arc::new(ShapeStrategy::new(base)),
        LayerKind::Facilities => Arc::new(FacilityStrategy::new(base)),
    }
}

fn colour(properties: &Properties, key: &str) -> Option<String> {
    properties.get_string(key).map(|c| {
        if c.starts_with('#') {
            c
        } else {
            format!("#{}", c)
        }
    })
}

pub fn format_delay(seconds: f64) -> String {
    let minutes = (seconds / 60.0).round() as i64;
    match minutes {
        0 => "on time".to_string(),
        m if m > 0 => format!("{} min late", m),
        m => format!("{} min early", -m),
    }
}

async fn fetch_records(fetcher: &DetailFetcher, url: &str, params: &[(&str, &str)], options: FetchOptions) -> Vec<Value> {
    match fetcher.get(url, params, options).await {
        Payload::Json(Value::Array(items)) => items,
        Payload::Json(Value::Null) => Vec::new(),
        Payload::Json(single) => vec![single],
        Payload::Text(_) => Vec::new(),
    }
}

// vehicles

pub struct VehicleStrategy {
    detail: Arc<VehicleDetail>,
}

impl VehicleStrategy {
    pub fn new(base: String) -> Self {
        Self {
            detail: Arc::new(VehicleDetail { base }),
        }
    }
}

impl LayerStrategy for VehicleStrategy {
    fn kind(&self) -> LayerKind {
        LayerKind::Vehicles
    }

    fn id_field(&self) -> &str {
        "vehicle_id"
    }

    fn popup(&self, feature: &Feature) -> PopupContent {
        let p = &feature.properties;
        let title = p
            .get_string("route_short_name")
            .or_else(|| p.get_string("route_id"))
            .unwrap_or_else(|| format!("Vehicle {}", p.get_string("label").unwrap_or_else(|| feature.id.clone())));

        PopupContent::new(title)
            .row("Headsign", p.get_string("trip_headsign"))
            .row("Next stop", p.get_string("next_stop"))
            .row("Delay", p.get_f64("delay").map(format_delay))
            .row("Vehicle", p.get_string("label"))
    }

    fn style(&self, feature: &Feature) -> MarkerStyle {
        let p = &feature.properties;
        let icon = match p.get_f64("route_type").map(|t| t as i64) {
            Some(0) | Some(5) | Some(12) => "tram",
            Some(1) => "metro",
            Some(2) => "train",
            Some(4) => "ferry",
            _ => "bus",
        };

        MarkerStyle {
            icon: icon.to_string(),
            color: colour(p, "route_color"),
            rotation_deg: p.get_f64("bearing"),
            label: p.get_string("route_short_name"),
        }
    }

    fn detail_source(&self) -> Arc<dyn DetailSource> {
        self.detail.clone()
    }

    fn search_fields(&self) -> &[&'static str] {
        &["vehicle_id", "label", "route_short_name", "trip_headsign"]
    }
}

pub struct VehicleDetail {
    base: String,
}

impl DetailSource for VehicleDetail {
    fn load<'a>(&'a self, fetcher: &'a DetailFetcher, properties: &'a Properties) -> BoxFuture<'a, DetailLoad> {
        async move {
            // the vehicle's own properties are always shown, trip records only add to them
            let records = match properties.get_string("trip_id") {
                Some(trip_id) => {
                    let chateau = properties.get_string("chateau").unwrap_or_default();
                    let url = format!("{}/get_trip_information", self.base);
                    fetch_records(
                        fetcher,
                        &url,
                        &[("chateau", chateau.as_str()), ("trip_id", trip_id.as_str())],
                        FetchOptions::json(BackendKind::Session).with_ttl(Duration::from_secs(30)),
                    )
                    .await
                }
                None => Vec::new(),
            };

            let has_next_stop = properties.contains_key("next_stop")
                || records
                    .first()
                    .is_some_and(|r| r.get("next_stop").is_some_and(|v| !v.is_null()));

            DetailLoad {
                found: true,
                missing: if has_next_stop {
                    Vec::new()
                } else {
                    vec!["next_stop".to_string()]
                },
                records,
            }
        }
        .boxed()
    }

    fn infill<'a>(
        &'a self,
        fetcher: &'a DetailFetcher,
        properties: &'a Properties,
        field: &'a str,
    ) -> BoxFuture<'a, Option<Value>> {
        async move {
            let vehicle_id = properties.get_string("vehicle_id")?;
            let chateau = properties.get_string("chateau").unwrap_or_default();
            let url = format!("{}/vehicle_{}", self.base, field);

            fetch_records(
                fetcher,
                &url,
                &[("chateau", chateau.as_str()), ("vehicle_id", vehicle_id.as_str())],
                FetchOptions::json(BackendKind::None),
            )
            .await
            .into_iter()
            .find_map(|r| r.get(field).filter(|v| !v.is_null()).cloned())
        }
        .boxed()
    }
}

// stops

pub struct StopStrategy {
    theme: Theme,
    detail: Arc<StopDetail>,
}

impl StopStrategy {
    pub fn new(base: String, theme: Theme) -> Self {
        Self {
            theme,
            detail: Arc::new(StopDetail { base }),
        }
    }
}

impl LayerStrategy for StopStrategy {
    fn kind(&self) -> LayerKind {
        LayerKind::Stops
    }

    fn id_field(&self) -> &str {
        "stop_id"
    }

    fn popup(&self, feature: &Feature) -> PopupContent {
        let p = &feature.properties;
        PopupContent::new(p.get_string("stop_name").unwrap_or_else(|| feature.id.clone()))
            .row("Code", p.get_string("stop_code"))
            .row("Platform", p.get_string("platform_code"))
    }

    fn style(&self, feature: &Feature) -> MarkerStyle {
        let fill = match self.theme {
            Theme::Dark => "#ffffff",
            Theme::Light | Theme::System => "#1c1c1c",
        };
        MarkerStyle {
            icon: "stop".to_string(),
            color: colour(&feature.properties, "stop_color").or_else(|| Some(fill.to_string())),
            rotation_deg: None,
            label: None,
        }
    }

    fn detail_source(&self) -> Arc<dyn DetailSource> {
        self.detail.clone()
    }

    fn search_fields(&self) -> &[&'static str] {
        &["stop_id", "stop_name", "stop_code"]
    }
}

pub struct StopDetail {
    base: String,
}

impl DetailSource for StopDetail {
    fn load<'a>(&'a self, fetcher: &'a DetailFetcher, properties: &'a Properties) -> BoxFuture<'a, DetailLoad> {
        async move {
            let Some(stop_id) = properties.get_string("stop_id") else {
                return DetailLoad::default();
            };
            let chateau = properties.get_string("chateau").unwrap_or_default();

            let url = format!("{}/departures_at_stop", self.base);
            let records = fetch_records(
                fetcher,
                &url,
                &[("chateau", chateau.as_str()), ("stop_id", stop_id.as_str())],
                FetchOptions::json(BackendKind::Session).with_ttl(Duration::from_secs(30)),
            )
            .await;

            DetailLoad {
                found: !records.is_empty(),
                records,
                missing: Vec::new(),
            }
        }
        .boxed()
    }

    fn infill<'a>(
        &'a self,
        _fetcher: &'a DetailFetcher,
        _properties: &'a Properties,
        _field: &'a str,
    ) -> BoxFuture<'a, Option<Value>> {
        futures::future::ready(None).boxed()
    }
}

// shapes

pub struct ShapeStrategy {
    detail: Arc<ShapeDetail>,
}

impl ShapeStrategy {
    pub fn new(base: String) -> Self {
        Self {
            detail: Arc::new(ShapeDetail { base }),
        }
    }
}

impl LayerStrategy for ShapeStrategy {
    fn kind(&self) -> LayerKind {
        LayerKind::Shapes
    }

    fn id_field(&self) -> &str {
        "shape_id"
    }

    fn popup(&self, feature: &Feature) -> PopupContent {
        let p = &feature.properties;
        let title = p
            .get_string("route_short_name")
            .or_else(|| p.get_string("route_long_name"))
            .unwrap_or_else(|| feature.id.clone());
        PopupContent::new(title)
            .row("Route", p.get_string("route_long_name"))
            .row("Agency", p.get_string("agency_name"))
    }

    fn style(&self, feature: &Feature) -> MarkerStyle {
        MarkerStyle {
            icon: "line".to_string(),
            color: colour(&feature.properties, "route_color"),
            rotation_deg: None,
            label: feature.properties.get_string("route_short_name"),
        }
    }

    fn detail_source(&self) -> Arc<dyn DetailSource> {
        self.detail.clone()
    }

    fn search_fields(&self) -> &[&'static str] {
        &["shape_id", "route_id", "route_short_name", "route_long_name"]
    }
}

pub struct ShapeDetail {
    base: String,
}

impl DetailSource for ShapeDetail {
    fn load<'a>(&'a self, fetcher: &'a DetailFetcher, properties: &'a Properties) -> BoxFuture<'a, DetailLoad> {
        async move {
            let Some(route_id) = properties.get_string("route_id") else {
                return DetailLoad::default();
            };
            let chateau = properties.get_string("chateau").unwrap_or_default();

            let url = format!("{}/route_info", self.base);
            // route metadata changes with schedule imports, not in realtime
            let records = fetch_records(
                fetcher,
                &url,
                &[("chateau", chateau.as_str()), ("route_id", route_id.as_str())],
                FetchOptions::json(BackendKind::Persistent).with_ttl(Duration::from_secs(6 * 3600)),
            )
            .await;

            DetailLoad {
                found: !records.is_empty(),
                records,
                missing: Vec::new(),
            }
        }
        .boxed()
    }

    fn infill<'a>(
        &'a self,
        _fetcher: &'a DetailFetcher,
        _properties: &'a Properties,
        _field: &'a str,
    ) -> BoxFuture<'a, Option<Value>> {
        futures::future::ready(None).boxed()
    }
}

// facilities

pub struct FacilityStrategy {
    detail: Arc<FacilityDetail>,
}

impl FacilityStrategy {
    pub fn new(base: String) -> Self {
        Self {
            detail: Arc::new(FacilityDetail { base }),
        }
    }
}

impl LayerStrategy for FacilityStrategy {
    fn kind(&self) -> LayerKind {
        LayerKind::Facilities
    }

    fn id_field(&self) -> &str {
        "facility_id"
    }

    fn popup(&self, feature: &Feature) -> PopupContent {
        let p = &feature.properties;
        PopupContent::new(p.get_string("name").unwrap_or_else(|| feature.id.clone()))
            .row("Type", p.get_string("facility_type"))
            .row("Status", p.get_string("status"))
    }

    fn style(&self, feature: &Feature) -> MarkerStyle {
        let p = &feature.properties;
        let icon = match p.get_string("facility_type").as_deref() {
            Some("elevator") => "elevator",
            Some("escalator") => "escalator",
            Some("bike_share") | Some("bike") => "bike",
            _ => "facility",
        };
        let color = match p.get_string("status").as_deref() {
            Some("out_of_service") | Some("closed") => "#d32f2f",
            Some("limited") => "#f9a825",
            _ => "#2e7d32",
        };
        MarkerStyle {
            icon: icon.to_string(),
            color: Some(color.to_string()),
            rotation_deg: None,
            label: None,
        }
    }

    fn detail_source(&self) -> Arc<dyn DetailSource> {
        self.detail.clone()
    }

    fn search_fields(&self) -> &[&'static str] {
        &["facility_id", "name", "facility_type"]
    }
}

pub struct FacilityDetail {
    base: String,
}

impl DetailSource for FacilityDetail {
    fn load<'a>(&'a self, fetcher: &'a DetailFetcher, properties: &'a Properties) -> BoxFuture<'a, DetailLoad> {
        async move {
            let Some(facility_id) = properties.get_string("facility_id") else {
                return DetailLoad::default();
            };

            let url = format!("{}/facility_status", self.base);
            let records = fetch_records(
                fetcher,
                &url,
                &[("facility_id", facility_id.as_str())],
                FetchOptions::json(BackendKind::Session).with_ttl(Duration::from_secs(60)),
            )
            .await;

            DetailLoad {
                found: !records.is_empty(),
                records,
                missing: Vec::new(),
            }
        }
        .boxed()
    }

    fn infill<'a>(
        &'a self,
        _fetcher: &'a DetailFetcher,
        _properties: &'a Properties,
        _field: &'a str,
    ) -> BoxFuture<'a, Option<Value>> {
        futures::future::ready(None).boxed()
    }
}
