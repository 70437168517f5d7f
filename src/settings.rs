use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, SystemTime},
};

use color_eyre::Result;
use eyre::eyre;
use log::{info, warn};
use serde::Deserialize;

pub const DEFAULT_SETTINGS_PATH: &str = "bridge_config.json";

/// Sentinel brightness multiplier meaning "drive the device at full brightness".
pub const MAX_BRIGHTNESS_SENTINEL: f64 = -1.0;

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Rgb,
    Cct,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Device {
    #[serde(default = "default_device_name")]
    pub name: String,
    pub topic: String,
    #[serde(rename = "type", default)]
    pub kind: DeviceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// In [0, 1], or [`MAX_BRIGHTNESS_SENTINEL`].
    #[serde(default = "default_brightness_multiplier")]
    pub brightness_multiplier: f64,
}

fn default_device_name() -> String {
    "Unknown".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_brightness_multiplier() -> f64 {
    1.0
}

/// Immutable snapshot of the bridge configuration store.
///
/// A reload always builds a complete new snapshot; readers hold an `Arc` to
/// whichever snapshot was current when they asked.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct BridgeSettings {
    pub hyperion_url: String,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_client_id: Option<String>,
    pub color_warmth: f64,
    pub throttle_interval: f64,
    pub transition_time: f64,
    #[serde(default)]
    pub devices: Vec<Device>,

    // Owned by the control panel, kept only so the full store deserializes.
    #[serde(default)]
    pub recent_colors: Vec<String>,
}

impl BridgeSettings {
    /// Devices driven by the automatic color sync: enabled `rgb` devices.
    pub fn sync_targets(&self) -> impl Iterator<Item = &Device> {
        self.devices
            .iter()
            .filter(|device| device.enabled && device.kind == DeviceKind::Rgb)
    }

    pub fn throttle_interval(&self) -> Duration {
        // A non-positive or non-finite interval disables throttling entirely
        Duration::try_from_secs_f64(self.throttle_interval).unwrap_or(Duration::ZERO)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            hyperion_url: "ws://127.0.0.1:8090/json-rpc".to_string(),
            mqtt_broker: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            mqtt_client_id: None,
            color_warmth: 1.0,
            throttle_interval: 1.0,
            transition_time: 0.1,
            devices: vec![],
            recent_colors: vec![],
        }
    }
}

pub fn read_settings(path: &Path) -> Result<BridgeSettings, config::ConfigError> {
    let defaults = BridgeSettings::default();

    config::Config::builder()
        .set_default("hyperion_url", defaults.hyperion_url)?
        .set_default("mqtt_broker", defaults.mqtt_broker)?
        .set_default("mqtt_port", i64::from(defaults.mqtt_port))?
        .set_default("mqtt_username", defaults.mqtt_username)?
        .set_default("mqtt_password", defaults.mqtt_password)?
        .set_default("color_warmth", defaults.color_warmth)?
        .set_default("throttle_interval", defaults.throttle_interval)?
        .set_default("transition_time", defaults.transition_time)?
        .add_source(config::File::from(path).format(config::FileFormat::Json))
        .build()?
        .try_deserialize::<BridgeSettings>()
}

/// Process-wide holder of the current [`BridgeSettings`] snapshot.
///
/// The store on disk is polled by modification time; a newer file is parsed in
/// full and swapped in, a missing or broken file leaves the previous snapshot
/// in place.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Arc<BridgeSettings>>,
    loaded_mtime: RwLock<Option<SystemTime>>,
    last_error: Mutex<Option<String>>,
}

impl SettingsStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = SettingsStore {
            path,
            current: RwLock::new(Arc::new(BridgeSettings::default())),
            loaded_mtime: RwLock::new(None),
            last_error: Mutex::new(None),
        };

        if let Err(e) = store.reload_if_changed().await {
            warn!(
                "Could not load settings from {}, using defaults: {:?}",
                store.path.display(),
                e
            );
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<BridgeSettings> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Reloads the snapshot if the store's modification time advanced since
    /// the last successful load. Returns whether a new snapshot was installed.
    ///
    /// File access runs off the async worker threads: the stat through
    /// `tokio::fs`, the parse on the blocking pool.
    pub async fn reload_if_changed(&self) -> Result<bool> {
        let mtime = tokio::fs::metadata(&self.path)
            .await
            .and_then(|metadata| metadata.modified())
            .map_err(|e| eyre!("Failed to stat {}: {}", self.path.display(), e))?;

        let loaded_mtime = *self
            .loaded_mtime
            .read()
            .map_err(|_| eyre!("Settings mtime lock poisoned"))?;

        if loaded_mtime.is_some_and(|loaded| mtime <= loaded) {
            return Ok(false);
        }

        let path = self.path.clone();
        let settings = tokio::task::spawn_blocking(move || read_settings(&path)).await??;

        {
            let mut current = self
                .current
                .write()
                .map_err(|_| eyre!("Settings lock poisoned"))?;
            *current = Arc::new(settings);
        }
        {
            let mut loaded_mtime = self
                .loaded_mtime
                .write()
                .map_err(|_| eyre!("Settings mtime lock poisoned"))?;
            *loaded_mtime = Some(mtime);
        }

        info!("Loaded settings from {}", self.path.display());

        Ok(true)
    }

    /// Like [`SettingsStore::reload_if_changed`], but logs failures instead of
    /// returning them and always hands back the snapshot to use.
    ///
    /// Called once per frame, so the same failure is only logged once.
    pub async fn refresh(&self) -> Arc<BridgeSettings> {
        let error = self.reload_if_changed().await.err().map(|e| e.to_string());

        let mut last_error = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(error) = &error {
            if last_error.as_ref() != Some(error) {
                warn!("Keeping previous settings: {}", error);
            }
        }
        *last_error = error;

        self.current()
    }
}
