use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dofconfig::{LightFieldConfig, ParameterChange};
use renderer::RendererConfig;
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// A configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LightFieldConfig,
    pub source: Option<PathBuf>,
}

/// Loads `explicit` when given, else the default config file when it exists,
/// else built-in defaults.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = LightFieldConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        info!(path = %path.display(), "loaded light field config");
        return Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
        });
    }

    let default_path = paths.config_file();
    if default_path.is_file() {
        let config = LightFieldConfig::load(&default_path)
            .with_context(|| format!("failed to load config {}", default_path.display()))?;
        info!(path = %default_path.display(), "loaded light field config");
        return Ok(LoadedConfig {
            config,
            source: Some(default_path),
        });
    }

    debug!(path = %default_path.display(), "no config file found; using defaults");
    Ok(LoadedConfig {
        config: LightFieldConfig::default(),
        source: None,
    })
}

/// Command-line parameter overrides in a fixed order.
pub fn overrides(args: &RunArgs) -> Vec<ParameterChange> {
    let mut changes = Vec::new();
    if let Some(views) = args.views {
        changes.push(ParameterChange::Views(views));
    }
    if let Some(resolution) = args.resolution {
        changes.push(ParameterChange::Resolution(resolution));
    }
    if let Some(aperture) = args.aperture {
        changes.push(ParameterChange::Aperture(aperture));
    }
    if let Some(distance) = args.focal_distance {
        changes.push(ParameterChange::FocalDistance(distance));
    }
    changes
}

/// Applies every override together and validates the result once.
pub fn apply_overrides(config: &LightFieldConfig, args: &RunArgs) -> Result<LightFieldConfig> {
    let changes = overrides(args);
    if changes.is_empty() {
        return Ok(config.clone());
    }
    debug!(?changes, "applying command-line overrides");
    config
        .with_changes(changes)
        .context("invalid command-line override")
}

pub fn renderer_config(args: &RunArgs, light_field: LightFieldConfig) -> RendererConfig {
    let defaults = RendererConfig::default();
    RendererConfig {
        surface_size: args.size.unwrap_or(defaults.surface_size),
        light_field,
        color_space: args.color_space,
        gpu_power: args.power,
        target_fps: match args.fps {
            Some(v) if v > 0.0 => Some(v),
            _ => None,
        },
        title: defaults.title,
    }
}
