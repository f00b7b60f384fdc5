use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// File name looked up in the project root.
pub const CONFIG_FILE: &str = ".filinglens.toml";

/// Engine tunables loaded from `.filinglens.toml`.
/// Every field has a default; the file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Consecutive long-form matches further apart than this are not bridged.
    pub bridge_distance_px: f64,
    pub default_zoom: f64,
    /// Cluster threshold for every kind except transcripts.
    pub filing_cluster_px: f64,
    pub max_zoom: f64,
    pub min_zoom: f64,
    /// Delay before highlighting a freshly mounted document.
    pub new_document_delay_ms: u64,
    /// Delay before the layout-resize notification that follows a zoom.
    pub resize_notify_delay_ms: u64,
    pub scroll_retry_attempts: u32,
    /// Base delay for scroll retries; attempt `n` waits `n * base`.
    pub scroll_retry_base_ms: u64,
    /// Normalized (lowercase, no whitespace) style substring marking a slide container.
    pub slide_style_fingerprint: String,
    /// A transcript paragraph taller than this share of the viewport is a long speaker turn.
    pub tall_paragraph_ratio: f64,
    pub transcript_cluster_px: f64,
    /// Distance kept between the top edge and a transcript scroll target.
    pub transcript_scroll_offset_px: f64,
    pub viewport_height: f64,
    pub viewport_width: f64,
    pub zoom_step: f64,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            bridge_distance_px: 1000.0,
            default_zoom: 1.0,
            filing_cluster_px: 500.0,
            max_zoom: 2.0,
            min_zoom: 0.25,
            new_document_delay_ms: 500,
            resize_notify_delay_ms: 10,
            scroll_retry_attempts: 3,
            scroll_retry_base_ms: 100,
            slide_style_fingerprint: "position:relative;overflow:hidden".to_string(),
            tall_paragraph_ratio: 0.7,
            transcript_cluster_px: 200.0,
            transcript_scroll_offset_px: 20.0,
            viewport_height: 768.0,
            viewport_width: 1024.0,
            zoom_step: 0.25,
        };
    }
}

impl Config {
    /// Load config from `.filinglens.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. A file that exists but is
    /// malformed is an error; it never silently falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed,
    /// or `Error::InvalidConfig` if the values are inconsistent.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };

        return Self::parse(&content);
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` for malformed TOML or `Error::InvalidConfig`
    /// when zoom bounds or thresholds are out of range.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        return Ok(config);
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first violated invariant.
    fn validate(&self) -> Result<(), Error> {
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.default_zoom && self.default_zoom <= self.max_zoom) {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "zoom bounds must satisfy 0 < min_zoom <= default_zoom <= max_zoom (got {} / {} / {})",
                    self.min_zoom, self.default_zoom, self.max_zoom
                ),
            });
        }
        if self.scroll_retry_attempts == 0 {
            return Err(Error::InvalidConfig {
                reason: "scroll_retry_attempts must be at least 1".to_string(),
            });
        }
        if self.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return Err(Error::InvalidConfig {
                reason: "viewport dimensions must be positive".to_string(),
            });
        }
        return Ok(());
    }

    pub fn new_document_delay(&self) -> Duration {
        return Duration::from_millis(self.new_document_delay_ms);
    }

    pub fn resize_notify_delay(&self) -> Duration {
        return Duration::from_millis(self.resize_notify_delay_ms);
    }

    pub fn scroll_retry_base(&self) -> Duration {
        return Duration::from_millis(self.scroll_retry_base_ms);
    }

    /// Clamp a requested scale into the configured zoom bounds.
    pub fn clamp_zoom(&self, scale: f64) -> f64 {
        return scale.clamp(self.min_zoom, self.max_zoom);
    }
}
