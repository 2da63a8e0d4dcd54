//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hosted backend endpoint and public key.
    pub backend: BackendCfg,
    /// Google OAuth client used for sign-in.
    pub google: GoogleCfg,
    /// Buckets and signed-URL lifetime.
    #[serde(default)]
    pub storage: StorageCfg,
    /// Paging and polling knobs for the sync engines.
    #[serde(default)]
    pub sync: SyncCfg,
}

/// Project URL and anon key of the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCfg {
    /// e.g. `https://abcd.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
}

/// Installed-app OAuth client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCfg {
    /// Path to the client secret JSON downloaded from the Google console.
    pub client_secret_path: String,
}

/// Object storage layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
    /// Bucket holding `{user}/{job}/input.png` and `output.png`.
    pub jobs_bucket: String,
    /// Bucket holding template previews.
    pub templates_bucket: String,
    /// Lifetime of issued signed URLs.
    pub signed_url_ttl_secs: u64,
    /// Where downloaded images are written.
    pub download_dir: String,
}

/// Paging and polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCfg {
    pub jobs_page_size: u32,
    pub templates_page_size: u32,
    /// Interval between polls of pending jobs.
    pub poll_interval_secs: u64,
    /// Edge function that processes an uploaded job.
    pub process_function: String,
}

impl SyncCfg {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Whether the backend and OAuth client are configured.
    pub fn is_complete(&self) -> bool {
        !self.backend.url.trim().is_empty()
            && !self.backend.anon_key.trim().is_empty()
            && !self.google.client_secret_path.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendCfg {
                url: "".into(),
                anon_key: "".into(),
            },
            google: GoogleCfg {
                client_secret_path: "client_secret.json".into(),
            },
            storage: StorageCfg::default(),
            sync: SyncCfg::default(),
        }
    }
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            jobs_bucket: "jobs".into(),
            templates_bucket: "templates".into(),
            signed_url_ttl_secs: 3600,
            download_dir: ".".into(),
        }
    }
}

impl Default for SyncCfg {
    /// Matches the page size and poll cadence of the mobile client.
    fn default() -> Self {
        Self {
            jobs_page_size: 6,
            templates_page_size: 10,
            poll_interval_secs: 5,
            process_function: "main".into(),
        }
    }
}
