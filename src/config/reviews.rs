// src/config/reviews.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "REVIEWS_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/reviews.toml";
pub const DEFAULT_JSON_PATH: &str = "config/reviews.json";

pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_MAPS_API_KEY";
pub const ENV_HOSTAWAY_API_KEY: &str = "HOSTAWAY_API_KEY";
pub const ENV_KV_URL: &str = "KV_REST_API_URL";
pub const ENV_KV_TOKEN: &str = "KV_REST_API_TOKEN";

fn default_timeout_ms() -> u64 {
    8_000
}
fn default_google_base_url() -> String {
    crate::ingest::providers::google::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hostaway: HostawayConfig,
    pub google: GoogleConfig,
    pub fetch: FetchConfig,
    pub approvals: ApprovalsConfig,
}

/// Where Hostaway reviews come from: a fixture file or the HTTP API.
/// `url` wins when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostawayConfig {
    pub fixture_path: Option<PathBuf>,
    pub url: Option<String>,
    /// "ENV" means: read from HOSTAWAY_API_KEY
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// "ENV" means: read from GOOGLE_MAPS_API_KEY
    pub api_key: Option<String>,
    pub base_url: String,
    pub places: Vec<PlaceConfig>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: Some("ENV".to_string()),
            base_url: default_google_base_url(),
            places: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceConfig {
    pub place_id: String,
    #[serde(default)]
    pub listing_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// KV when its env vars are present, memory otherwise.
    #[default]
    Auto,
    Memory,
    Kv,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalsConfig {
    pub store: StoreKind,
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading reviews config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $REVIEWS_CONFIG_PATH
    /// 2) config/reviews.toml
    /// 3) config/reviews.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("REVIEWS_CONFIG_PATH points to non-existent path"));
            }
        }
        for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    fn sanitize(&mut self) {
        self.fetch.timeout_ms = self.fetch.timeout_ms.clamp(100, 60_000);
        self.google.base_url = self.google.base_url.trim_end_matches('/').to_string();
        if self.google.base_url.is_empty() {
            self.google.base_url = default_google_base_url();
        }
        self.google.places.retain(|p| !p.place_id.trim().is_empty());
    }

    /// Google API key with "ENV" resolved; `None` when not configured.
    pub fn google_api_key(&self) -> Option<String> {
        resolve_secret(self.google.api_key.as_deref(), ENV_GOOGLE_API_KEY)
    }

    pub fn hostaway_api_key(&self) -> Option<String> {
        resolve_secret(self.hostaway.api_key.as_deref(), ENV_HOSTAWAY_API_KEY)
    }
}

/// `"ENV"` (any case) reads the named env var; blank values count as unset.
fn resolve_secret(raw: Option<&str>, env_name: &str) -> Option<String> {
    let raw = raw?.trim();
    let value = if raw.eq_ignore_ascii_case("env") {
        std::env::var(env_name).ok()?
    } else {
        raw.to_string()
    };
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing reviews config json");
    }
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing reviews config toml");
    }
    // No usable extension: try JSON, then TOML.
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    toml::from_str(s).map_err(|e| anyhow!("unsupported reviews config format: {e}"))
}
