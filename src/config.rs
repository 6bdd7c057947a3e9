// ============================================================================
// SETTINGS — service endpoint, limits, and timeouts
// ============================================================================
//
// Resolution order: built-in defaults < optional settings.json in the OS data
// directory < environment variables. Environment wins so a shell override
// never requires editing the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Inpainting service endpoint URL.
    pub api_url: String,
    /// Bearer token for the service. Empty = mock mode (local placeholder
    /// results, always-healthy probe).
    pub api_key: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum source-image side length accepted for submission.
    pub max_image_dimension: u32,
    /// Minimum source-image side length accepted for submission.
    pub min_image_dimension: u32,
    /// Maximum upload size in megabytes.
    pub max_file_size_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "https://api.nanobanana.ai/v1/inpaint".to_string(),
            api_key: String::new(),
            timeout_secs: 120,
            max_image_dimension: 2048,
            min_image_dimension: 256,
            max_file_size_mb: 10,
        }
    }
}

impl Settings {
    /// Load settings from the data-dir file (if present), then apply
    /// environment overrides. Never fails: a malformed file is logged and
    /// replaced by defaults.
    pub fn load() -> Self {
        let mut settings = Self::from_file().unwrap_or_default();
        settings.apply_env_overrides();
        settings
    }

    fn from_file() -> Option<Self> {
        let path = Self::file_path();
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(s) => Some(s),
            Err(e) => {
                crate::log_warn!("Ignoring malformed settings file {:?}: {}", path, e);
                None
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply override values from a lookup (the process environment in
    /// production; a plain map in tests). An empty url is ignored; an empty
    /// key is applied, since clearing the key is how mock mode is selected.
    /// Unparsable numeric values are ignored.
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("NANOBANANA_URL") {
            if !url.is_empty() {
                self.api_url = url;
            }
        }
        if let Some(key) = get("NANOBANANA_KEY") {
            self.api_key = key;
        }
        if let Some(t) = get("REQUEST_TIMEOUT") {
            if let Ok(secs) = t.parse() {
                self.timeout_secs = secs;
            }
        }
        if let Some(d) = get("MAX_IMAGE_DIMENSION") {
            if let Ok(px) = d.parse() {
                self.max_image_dimension = px;
            }
        }
        if let Some(d) = get("MIN_IMAGE_DIMENSION") {
            if let Ok(px) = d.parse() {
                self.min_image_dimension = px;
            }
        }
        if let Some(m) = get("MAX_FILE_SIZE_MB") {
            if let Ok(mb) = m.parse() {
                self.max_file_size_mb = mb;
            }
        }
    }

    /// Persist the current settings to the data-dir file.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }

    /// `<data dir>/InpaintFE/settings.json`, alongside the session log.
    pub fn file_path() -> PathBuf {
        crate::logger::app_data_dir().join("settings.json")
    }

    /// True when no API key is configured and the client should fabricate
    /// placeholder results locally.
    pub fn mock_mode(&self) -> bool {
        self.api_key.is_empty() || self.api_key == "demo_key_placeholder"
    }
}
