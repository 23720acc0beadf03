mod types;

pub use types::*;

use amur_common::Resolution;
use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./amur.toml",
        "~/.config/amur/config.toml",
        "/etc/amur/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    let folder = config.storage.public_folder.to_string_lossy().into_owned();
    let expanded = shellexpand::tilde(&folder);
    config.storage.public_folder = expanded.as_ref().into();
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.pipeline.workers == 0 {
        anyhow::bail!("pipeline.workers must be at least 1");
    }

    if config.pipeline.queue_capacity == 0 {
        anyhow::bail!("pipeline.queue_capacity must be at least 1");
    }

    if config.watch.enabled && config.watch.settle_millis == 0 {
        anyhow::bail!("watch.settle_millis cannot be 0");
    }

    if config.sweep.enabled && config.sweep.interval_secs == 0 {
        anyhow::bail!("sweep.interval_secs cannot be 0");
    }

    if config.pipeline.use_distributed_queue && config.queue.redis_url.trim().is_empty() {
        anyhow::bail!("use_distributed_queue is set but queue.redis_url is empty");
    }

    for &height in &config.video.candidate_video_heights {
        if Resolution::standard(height).is_none() {
            tracing::warn!(height, "Candidate video height has no standard resolution, skipping");
        }
    }

    if !config.storage.public_folder.exists() {
        tracing::warn!(
            "Public folder does not exist yet: {:?}",
            config.storage.public_folder
        );
    }

    Ok(())
}
