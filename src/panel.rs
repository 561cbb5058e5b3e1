//! Host-panel lifecycle — configuration, creation, destruction.
//!
//! The host's tab/dock system creates and destroys panels through an
//! explicit registry. The registry enforces the one-live-panel rule itself:
//! creating a second panel returns `AlreadyOpen` for the host to prompt on,
//! instead of an ad hoc global existence check.

use crate::capture::{WindowBackend, XcapBackend};
use crate::driver::StatusDriver;
use crate::fetch::{CurlFetcher, Fetcher};
use crate::store::ResourceStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Display name the host uses for the tab and for notice titles.
pub const PRODUCT_NAME: &str = "Reference Image";
/// Stable identifier for registry keys and the config directory.
pub const INTERNAL_NAME: &str = "reference-image";

/// Panel configuration, loaded from
/// `~/.config/reference-image/config.json`. Every field has a default; a
/// missing or invalid file means defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Where transient files live. Defaults to the platform cache dir.
    pub working_dir: Option<PathBuf>,
    /// Inclusive bounds for the per-tick oscillation counter.
    pub oscillation_min: i32,
    pub oscillation_max: i32,
    /// Minimum time between capture cycles.
    pub capture_interval_ms: u64,
    /// Override for the download utility binary (defaults to curl on PATH).
    pub fetch_command: Option<PathBuf>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            oscillation_min: -5,
            oscillation_max: 5,
            capture_interval_ms: 250,
            fetch_command: None,
        }
    }
}

impl PanelConfig {
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(INTERNAL_NAME)
            .join("config.json")
    }

    /// Load the user config, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => {
                    log::info!("[CONFIG] loaded {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("[CONFIG] invalid {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Resolved working directory for the panel's transients.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(INTERNAL_NAME)
        })
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("{PRODUCT_NAME} is already open (panel '{0}')")]
    AlreadyOpen(String),
    #[error("no panel '{0}' is open")]
    NotOpen(String),
    #[error("failed to initialize panel: {0}")]
    Init(String),
}

/// A live panel: its id plus the driver the host ticks.
pub struct Panel {
    id: String,
    driver: StatusDriver,
}

impl Panel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> &StatusDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut StatusDriver {
        &mut self.driver
    }
}

/// Registry of live panels, keyed by panel id, owned by the host's
/// lifecycle manager. At most one entry may exist.
pub struct PanelRegistry {
    panels: Mutex<HashMap<String, Panel>>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self {
            panels: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Panel>> {
        self.panels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a panel with the production fetch and capture backends.
    pub fn create(&self, id: &str, config: &PanelConfig) -> Result<(), PanelError> {
        let fetcher: Arc<dyn Fetcher> = match &config.fetch_command {
            Some(binary) => Arc::new(CurlFetcher::with_binary(binary.clone())),
            None => Arc::new(CurlFetcher::new().map_err(|e| PanelError::Init(e.to_string()))?),
        };
        self.create_with(id, config, fetcher, Arc::new(XcapBackend))
    }

    /// Create a panel with injected primitives. This is the seam the tests
    /// use; `create` is a thin wrapper over it.
    pub fn create_with(
        &self,
        id: &str,
        config: &PanelConfig,
        fetcher: Arc<dyn Fetcher>,
        backend: Arc<dyn WindowBackend>,
    ) -> Result<(), PanelError> {
        let mut panels = self.lock();
        if let Some(existing) = panels.keys().next() {
            return Err(PanelError::AlreadyOpen(existing.clone()));
        }

        let store = ResourceStore::new(config.working_dir())
            .map_err(|e| PanelError::Init(e.to_string()))?;
        let driver = StatusDriver::new(
            store,
            fetcher,
            backend,
            (config.oscillation_min, config.oscillation_max),
            config.capture_interval(),
            (1, 1),
        );
        panels.insert(
            id.to_string(),
            Panel {
                id: id.to_string(),
                driver,
            },
        );
        log::info!("[PANEL] created '{}'", id);
        Ok(())
    }

    /// Destroy a panel. Dropping the driver supersedes in-flight cycles and
    /// joins its workers.
    pub fn destroy(&self, id: &str) -> Result<(), PanelError> {
        match self.lock().remove(id) {
            Some(_) => {
                log::info!("[PANEL] destroyed '{}'", id);
                Ok(())
            }
            None => Err(PanelError::NotOpen(id.to_string())),
        }
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Run `f` against a live panel, e.g. a tick or a source selection.
    pub fn with_panel<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Panel) -> R,
    ) -> Result<R, PanelError> {
        let mut panels = self.lock();
        let panel = panels
            .get_mut(id)
            .ok_or_else(|| PanelError::NotOpen(id.to_string()))?;
        Ok(f(panel))
    }
}

impl Default for PanelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
