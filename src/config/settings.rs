//! Runtime configuration loader and common helpers.

use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};

/// Hard ceiling most public RPC endpoints place on `eth_getLogs` spans.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 100_000;

/// ------------------------------------------------------------------
/// Main Settings object
/// ------------------------------------------------------------------
#[derive(Clone, Debug)]
pub struct Settings {
    /* -------- chain endpoints ----------------------- */
    pub rpc_url: String,
    pub fallback_rpc_url: String,
    pub contract_address: String,

    /* -------- sync tuning --------------------------- */
    pub max_block_range: u64,
    pub default_page_size: usize,
    /// Status code the registry reports for deleted tokens. Confirm against
    /// the deployed contract before relying on it; never hardcode it at
    /// call sites.
    pub deleted_status_code: u8,

    /* -------- local cache --------------------------- */
    pub cache_dir: PathBuf,

    /* -------- transport ----------------------------- */
    pub rpc_timeout_secs: u64,
    pub metadata_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://rpc-campnetwork.xyz".to_string(),
            fallback_rpc_url: String::new(),
            contract_address: "0xF90733b9eCDa3b49C250B2C3E3E42c96fC93324E".to_string(),
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            default_page_size: 20,
            deleted_status_code: 1,
            cache_dir: PathBuf::from("./cache"),
            rpc_timeout_secs: 10,
            metadata_timeout_secs: 5,
        }
    }
}

impl Settings {
    /// --------------------------------------------------------------
    /// Read a settings JSON file from disk.
    /// --------------------------------------------------------------
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading settings file {:?}", path.as_ref()))?;
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        let defaults = Settings::default();

        /* -------- plain strings ---------------------------------- */
        let rpc_url = json["rpc_url"]
            .as_str()
            .unwrap_or(&defaults.rpc_url)
            .to_string();
        let fallback_rpc_url = json["fallback_rpc_url"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let contract_address = json["contract_address"]
            .as_str()
            .unwrap_or(&defaults.contract_address)
            .to_string();

        /* -------- numeric parameters ----------------------------- */
        let max_block_range = json["max_block_range"]
            .as_u64()
            .unwrap_or(defaults.max_block_range);
        let default_page_size = json["default_page_size"]
            .as_u64()
            .unwrap_or(defaults.default_page_size as u64) as usize;
        let deleted_status_code = json["deleted_status_code"]
            .as_u64()
            .unwrap_or(defaults.deleted_status_code as u64) as u8;
        let rpc_timeout_secs = json["rpc_timeout_secs"]
            .as_u64()
            .unwrap_or(defaults.rpc_timeout_secs);
        let metadata_timeout_secs = json["metadata_timeout_secs"]
            .as_u64()
            .unwrap_or(defaults.metadata_timeout_secs);

        /* -------- misc ------------------------------------------- */
        let cache_dir = json["cache_dir"]
            .as_str()
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        Ok(Self {
            rpc_url,
            fallback_rpc_url,
            contract_address,
            max_block_range,
            default_page_size,
            deleted_status_code,
            cache_dir,
            rpc_timeout_secs,
            metadata_timeout_secs,
        })
    }

    /// --------------------------------------------------------------
    /// Load settings from the default config/settings.json file.
    /// --------------------------------------------------------------
    pub fn load() -> Result<Self> {
        Self::load_from_file("config/settings.json")
    }

    /// --------------------------------------------------------------
    /// Save settings to a specific file path.
    /// --------------------------------------------------------------
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let settings_json = serde_json::json!({
            "rpc_url": self.rpc_url,
            "fallback_rpc_url": self.fallback_rpc_url,
            "contract_address": self.contract_address,
            "max_block_range": self.max_block_range,
            "default_page_size": self.default_page_size,
            "deleted_status_code": self.deleted_status_code,
            "cache_dir": self.cache_dir,
            "rpc_timeout_secs": self.rpc_timeout_secs,
            "metadata_timeout_secs": self.metadata_timeout_secs,
        });

        let json_string = serde_json::to_string_pretty(&settings_json)?;
        fs::write(&path, json_string)
            .with_context(|| format!("writing settings to {:?}", path.as_ref()))?;

        Ok(())
    }
}
