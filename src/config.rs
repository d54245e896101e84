use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the artifact directory
pub const STORAGE_DIR_ENV: &str = "GIFSPLIT_STORAGE_DIR";

/// Directory name used next to the working directory and under the platform data dir
const STORAGE_DIR_NAME: &str = "processed_gifs";

/// Configuration for the artifact storage root
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Custom storage directory (from CLI or ENV)
    pub storage_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Create StorageConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (GIFSPLIT_STORAGE_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let storage_dir = cli_dir.or_else(|| {
            std::env::var(STORAGE_DIR_ENV)
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        });

        Self { storage_dir }
    }

    /// Resolve the storage root
    ///
    /// Priority:
    /// 1. CLI --storage-dir argument
    /// 2. GIFSPLIT_STORAGE_DIR environment variable
    /// 3. Local `processed_gifs` folder IF it already exists in the working directory
    /// 4. Platform-specific data directory from dirs-next (default)
    ///
    /// Platform paths:
    /// - Linux: ~/.local/share/gifsplit/processed_gifs
    /// - macOS: ~/Library/Application Support/gifsplit/processed_gifs
    /// - Windows: %APPDATA%\gifsplit\processed_gifs
    pub fn root(&self) -> PathBuf {
        // Priority 1: Custom directory from CLI or ENV
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }

        // Priority 2: Local folder IF it exists
        if let Ok(current_dir) = std::env::current_dir() {
            let local = current_dir.join(STORAGE_DIR_NAME);
            if local.is_dir() {
                return local;
            }
        }

        // Priority 3: Platform-specific data directory
        if let Some(dir) = dirs_next::data_dir() {
            return dir.join("gifsplit").join(STORAGE_DIR_NAME);
        }

        // Fallback: relative folder if everything else fails
        PathBuf::from(STORAGE_DIR_NAME)
    }
}

/// Ensure the storage root exists, returning it
pub fn ensure_dirs(config: &StorageConfig) -> Result<PathBuf> {
    let root = config.root();
    if !root.exists() {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;
    }
    Ok(root)
}
