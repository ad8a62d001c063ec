//! Initialize the configuration directory: create ~/.wabot, a default config and an empty directory file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

const DEFAULT_CONFIG: &str = r#"{
  "gateway": { "bind": "127.0.0.1", "port": 3000 },
  "evolution": { "baseUrl": null, "apiKey": null, "instanceName": null, "webhookUrl": null },
  "company": { "name": null },
  "sessions": { "finishedTtlSecs": 1800 }
}
"#;

const EMPTY_DIRECTORY: &str = "{\n  \"customers\": [],\n  \"invoices\": []\n}\n";

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every section at its default if missing.
/// - Writes an empty customer directory at the resolved directory path if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (cfg, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let directory = config::resolve_directory_path(&cfg, config_path);
    if !directory.exists() {
        if let Some(parent) = directory.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        std::fs::write(&directory, EMPTY_DIRECTORY)
            .with_context(|| format!("writing customer directory to {}", directory.display()))?;
        log::info!("created empty customer directory at {}", directory.display());
    } else {
        log::debug!(
            "customer directory already exists at {}, skipping",
            directory.display()
        );
    }

    Ok(config_dir)
}
