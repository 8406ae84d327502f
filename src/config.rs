/// Configuration management for the wallpaper gallery
use crate::error::{GalleryError, GalleryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const URL_VARS: &[&str] = &["SUPABASE_URL", "PUBLIC_SUPABASE_URL", "VITE_SUPABASE_URL"];
const KEY_VARS: &[&str] = &[
    "SUPABASE_ANON_KEY",
    "PUBLIC_SUPABASE_ANON_KEY",
    "VITE_SUPABASE_ANON_KEY",
];

/// Main gallery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    pub backend: BackendConfig,
    pub download_directory: PathBuf,
    pub popular_limit: usize,
    /// Seed an empty SQLite backend with the fallback dataset
    pub seed_fallback: bool,
}

/// Backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    Rest { url: String, anon_key: String },
    Sqlite { path: PathBuf },
    Offline,
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Rest { .. } => "rest",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Offline => "offline",
        }
    }
}

impl GalleryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GalleryResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> GalleryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_of = |keys: &[&str]| keys.iter().find_map(|key| lookup(*key));

        let url = first_of(URL_VARS);
        let sqlite_path = lookup("GALLERY_SQLITE_PATH").map(PathBuf::from);

        let kind = match lookup("GALLERY_BACKEND") {
            Some(kind) => kind.to_lowercase(),
            None if url.is_some() => "rest".to_string(),
            None if sqlite_path.is_some() => "sqlite".to_string(),
            None => "offline".to_string(),
        };

        let backend = match kind.as_str() {
            "rest" => BackendConfig::Rest {
                url: url.ok_or_else(|| {
                    GalleryError::Config("REST backend requires SUPABASE_URL".to_string())
                })?,
                anon_key: first_of(KEY_VARS).ok_or_else(|| {
                    GalleryError::Config("REST backend requires SUPABASE_ANON_KEY".to_string())
                })?,
            },
            "sqlite" => BackendConfig::Sqlite {
                path: sqlite_path.unwrap_or_else(|| PathBuf::from("./data/gallery.sqlite")),
            },
            "offline" => BackendConfig::Offline,
            other => {
                return Err(GalleryError::Config(format!(
                    "Unknown backend '{}' (expected rest, sqlite or offline)",
                    other
                )))
            }
        };

        let download_directory = lookup("GALLERY_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./downloads"));

        let popular_limit = lookup("GALLERY_POPULAR_LIMIT")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| GalleryError::Config("Invalid popular limit".to_string()))?;

        let seed_fallback = lookup("GALLERY_SEED_FALLBACK")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            backend,
            download_directory,
            popular_limit,
            seed_fallback,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GalleryResult<()> {
        if let BackendConfig::Rest { url, anon_key } = &self.backend {
            if url.trim().is_empty() {
                return Err(GalleryError::Config("REST URL cannot be empty".to_string()));
            }
            if anon_key.trim().is_empty() {
                return Err(GalleryError::Config("REST API key cannot be empty".to_string()));
            }
        }

        if self.popular_limit == 0 {
            return Err(GalleryError::Config(
                "Popular limit must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
