// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::diff::ChangeDetector;
use crate::errors::ConfigError;
use crate::kinds::LayerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" | "auto" => Ok(Theme::System),
            _ => Err(ConfigError::InvalidTheme(s.to_string())),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        })
    }
}

/// Zoom range and change detection of one layer.
#[derive(Debug, Clone)]
pub struct LayerOptions {
    /// Zoom at which nothing is clustered.
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub change_detector: ChangeDetector,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0.0,
            max_zoom: 18.0,
            change_detector: ChangeDetector::Always,
        }
    }
}

impl LayerOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::InvalidZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSyncConfig {
    pub endpoint: String,
    pub kind: LayerKind,
    pub poll_interval_ms: u64,
    pub detail_base_url: String,
    pub theme: Theme,
    /// Directory of the persistent cache. In memory when unset.
    pub cache_dir: Option<PathBuf>,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Skip redraws for features whose content did not change.
    pub skip_unchanged: bool,
    pub initial_fragment: Option<String>,
}

impl Default for LayerSyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://birch.catenarymaps.org/vehicles.geojson".to_string(),
            kind: LayerKind::Vehicles,
            poll_interval_ms: 10_000,
            detail_base_url: "https://birch.catenarymaps.org".to_string(),
            theme: Theme::System,
            cache_dir: Some(PathBuf::from("data/layer_cache")),
            min_zoom: 0.0,
            max_zoom: 18.0,
            skip_unchanged: false,
            initial_fragment: None,
        }
    }
}

impl LayerSyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in [&self.endpoint, &self.detail_base_url] {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        self.layer_options().validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn layer_options(&self) -> LayerOptions {
        LayerOptions {
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            change_detector: if self.skip_unchanged {
                ChangeDetector::Content
            } else {
                ChangeDetector::Always
            },
        }
    }
}
