// Engine configuration
//
// Layering: built-in defaults -> optional TOML file -> `TOUR__*` environment variables.
// Example: `TOUR__SCROLL_SETTLE_MS=800`, `TOUR__STORE__BACKEND=postgres`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_MEASURE_RETRIES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Directory for the JSON file backend. Defaults under the platform data dir.
    pub flags_dir: Option<PathBuf>,
    /// Required for the Postgres backend. Never logged unmasked.
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TourSettings {
    pub measure_retries: u32,
    pub measure_retry_delay_ms: u64,
    /// Wait before the first measurement of a build.
    pub build_settle_ms: u64,
    /// Wait after invoking the host's mode setter.
    pub mode_settle_ms: u64,
    /// Wait after issuing a scroll command.
    pub scroll_settle_ms: u64,
    /// Added to every measured `top` (e.g. a translucent status bar).
    pub top_inset: f64,
    /// Scroll back to the top when a tour that scrolled finishes.
    pub restore_scroll_on_finish: bool,
    pub store: StoreSettings,
}

impl Default for TourSettings {
    fn default() -> Self {
        Self {
            measure_retries: 3,
            measure_retry_delay_ms: 300,
            build_settle_ms: 500,
            mode_settle_ms: 500,
            scroll_settle_ms: 600,
            top_inset: 0.0,
            restore_scroll_on_finish: true,
            store: StoreSettings::default(),
        }
    }
}

impl TourSettings {
    /// Load settings. With `path`, that file must exist; otherwise `./tour.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("tour").required(false),
        };

        let cfg = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("TOUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read tour configuration")?;

        let settings: TourSettings = cfg
            .try_deserialize()
            .context("Tour configuration has invalid values")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to parse tour configuration")?;
        let settings: TourSettings = cfg
            .try_deserialize()
            .context("Tour configuration has invalid values")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.measure_retries > MAX_MEASURE_RETRIES {
            anyhow::bail!(
                "measure_retries must be at most {} (got {})",
                MAX_MEASURE_RETRIES,
                self.measure_retries
            );
        }
        if !self.top_inset.is_finite() || self.top_inset < 0.0 {
            anyhow::bail!("top_inset must be a non-negative number");
        }
        if self.store.backend == StoreBackend::Postgres
            && self
                .store
                .database_url
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            anyhow::bail!("store.database_url is required for the postgres backend");
        }
        Ok(())
    }

    pub fn measure_retry_delay(&self) -> Duration {
        Duration::from_millis(self.measure_retry_delay_ms)
    }

    pub fn build_settle(&self) -> Duration {
        Duration::from_millis(self.build_settle_ms)
    }

    pub fn mode_settle(&self) -> Duration {
        Duration::from_millis(self.mode_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}
