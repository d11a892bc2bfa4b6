// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use std::path::PathBuf;
use thiserror::Error;

/// Failure while talking to a polling or detail endpoint.
///
/// These never reach the user as errors. The cache and the poller log them and
/// fall back to an empty payload or the previous snapshot.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("feature collection is not valid GeoJSON: {0}")]
    GeoJson(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("deep link surface is not available")]
    Unavailable,
}

/// Construction time errors. Raised immediately and never caught inside the
/// library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown theme {0:?}, expected one of light, dark, system")]
    InvalidTheme(String),
    #[error("unknown layer kind {0:?}, expected one of vehicles, stops, shapes, facilities")]
    InvalidLayerKind(String),
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    #[error("zoom range {min}..={max} is empty")]
    InvalidZoomRange { min: f64, max: f64 },
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error accessing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
