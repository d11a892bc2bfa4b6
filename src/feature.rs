// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::errors::FetchError;
use geojson::{GeoJson, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Opaque reference to the renderer's on-screen object for one feature id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

/// Token for one click listener attached to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<geo_types::Coord<f64>> for LatLng {
    fn from(c: geo_types::Coord<f64>) -> Self {
        Self { lat: c.y, lon: c.x }
    }
}

/// Property bag of a feature.
///
/// Updates never mutate a bag in place; [`Properties::with`] returns a new
/// value so a bag that is still referenced by a click context or an in flight
/// detail fetch is never changed underneath it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(Map<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String form of a property. Numbers and booleans are formatted, null and
    /// nested values are treated as absent.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value.into());
        Self(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One trackable entity. `id` is stable across polls, `properties` are
/// replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub geometry: Option<Geometry>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(id: impl Into<String>, properties: Properties) -> Self {
        Self {
            id: id.into(),
            geometry: None,
            properties,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Point the map centres on for this feature. Lines and polygons use their
    /// first vertex.
    pub fn anchor(&self) -> Option<LatLng> {
        let geometry = self.geometry.as_ref()?;
        let shape = geo_types::Geometry::<f64>::try_from(&geometry.value).ok()?;
        first_coord(&shape).map(LatLng::from)
    }
}

fn first_coord(shape: &geo_types::Geometry<f64>) -> Option<geo_types::Coord<f64>> {
    use geo_types::Geometry as G;

    match shape {
        G::Point(p) => Some(p.0),
        G::Line(l) => Some(l.start),
        G::LineString(ls) => ls.0.first().copied(),
        G::Polygon(p) => p.exterior().0.first().copied(),
        G::MultiPoint(mp) => mp.0.first().map(|p| p.0),
        G::MultiLineString(mls) => mls.0.first()?.0.first().copied(),
        G::MultiPolygon(mp) => mp.0.first()?.exterior().0.first().copied(),
        G::GeometryCollection(gc) => gc.0.iter().find_map(first_coord),
        G::Rect(r) => Some(r.min()),
        G::Triangle(t) => Some(t.0),
    }
}

/// Decodes a polled GeoJSON feature collection.
///
/// The feature id comes from the GeoJSON `id` member, falling back to an `id`
/// property. Features with neither are the producer's problem and are dropped
/// with a warning.
pub fn features_from_geojson(text: &str) -> Result<Vec<Feature>, FetchError> {
    let parsed: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| FetchError::GeoJson(e.to_string()))?;

    let collection = match parsed {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => geojson::FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(FetchError::GeoJson(
                "expected a FeatureCollection, got a bare geometry".to_string(),
            ));
        }
    };

    let mut features = Vec::with_capacity(collection.features.len());
    let mut dropped = 0usize;

    for f in collection.features {
        let properties: Properties = f.properties.clone().unwrap_or_default().into();

        let id = match &f.id {
            Some(geojson::feature::Id::String(s)) => Some(s.clone()),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => properties.get_string("id"),
        };

        match id {
            Some(id) => features.push(Feature {
                id,
                geometry: f.geometry,
                properties,
            }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!("dropped {} features without an id", dropped);
    }

    Ok(features)
}
