use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub balloons: BalloonsConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where hourly balloon snapshots live (`<base_url>/<hh>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalloonsConfig {
    #[serde(default = "default_balloons_base_url")]
    pub base_url: String,
}

/// Radio-browser catalog sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Full search URLs, queried concurrently.  Earlier endpoints win on
    /// duplicate station ids.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Server that receives click reports (`POST /json/url/<uuid>`).
    #[serde(default = "default_click_base_url")]
    pub click_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Whether the player is trusted with HLS manifests.
    #[serde(default = "default_segmented_streams")]
    pub segmented_streams: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for BalloonsConfig {
    fn default() -> Self {
        Self {
            base_url: default_balloons_base_url(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            click_base_url: default_click_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            max_results: default_max_results(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            segmented_streams: default_segmented_streams(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_balloons_base_url() -> String {
    "https://a.windbornesystems.com/treasure".to_string()
}

const CATALOG_FIELDS: &str =
    "name,url_resolved,url,favicon,countrycode,state,stationuuid,geo_lat,geo_long,tags,clickcount";

fn default_endpoints() -> Vec<String> {
    [
        ("de1", 500, 1000),
        ("fi1", 1500, 1500),
        ("at1", 3000, 2000),
        ("de1", 5000, 2500),
        ("de2", 7500, 3000),
    ]
    .iter()
    .map(|(host, offset, limit)| {
        format!(
            "https://{host}.api.radio-browser.info/json/stations/search?offset={offset}&limit={limit}\
             &hidebroken=true&has_geo_info=true&order=clickcount&reverse=true&fields={CATALOG_FIELDS}"
        )
    })
    .collect()
}

fn default_click_base_url() -> String {
    "https://de1.api.radio-browser.info".to_string()
}

fn default_user_agent() -> String {
    format!("skyradio/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_radius_km() -> f64 {
    500.0
}

fn default_max_results() -> usize {
    10
}

fn default_volume() -> f32 {
    0.5
}

fn default_segmented_streams() -> bool {
    true
}

impl Config {
    /// Load `<config_dir>/config.toml`, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
