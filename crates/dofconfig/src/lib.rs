//! Light-field camera configuration.
//!
//! The four user-facing parameters (views, resolution, aperture and focal
//! distance) live in `[array]`; projection constants live in `[lens]` and the
//! final presentation settings in `[output]`. Every table is optional in TOML
//! and falls back to the defaults below.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const MIN_VIEWS: u32 = 1;
pub const MAX_VIEWS: u32 = 10;
pub const MIN_RESOLUTION: u32 = 256;
pub const MAX_RESOLUTION: u32 = 4096;
pub const RESOLUTION_STEP: u32 = 256;
pub const MAX_APERTURE: f32 = 1.0;
pub const MAX_FOCAL_DISTANCE: f32 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How tile viewports are derived when `resolution` is not a multiple of `views`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TilingPolicy {
    /// Floor the origin and ceil the extent; neighbouring tiles may share one pixel.
    #[default]
    Overlap,
    /// Require `resolution % views == 0` so tiles never overlap.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapping {
    #[default]
    Aces,
    None,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArraySettings {
    pub views: u32,
    pub resolution: u32,
    pub aperture: f32,
    pub focal_distance: f32,
    pub tiling: TilingPolicy,
}

impl Default for ArraySettings {
    fn default() -> Self {
        Self {
            views: 4,
            resolution: 4096,
            aperture: 0.05,
            focal_distance: 1.73,
            tiling: TilingPolicy::Overlap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LensSettings {
    pub near: f32,
    pub far: f32,
    /// Half height of the focal rectangle at unit distance.
    pub frame_half_extent: f32,
    pub flip_y: bool,
}

impl Default for LensSettings {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 10.0,
            frame_half_extent: 0.6,
            flip_y: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    #[serde(deserialize_with = "deserialize_tone_mapping")]
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            tone_mapping: ToneMapping::Aces,
            exposure: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LightFieldConfig {
    pub array: ArraySettings,
    pub lens: LensSettings,
    pub output: OutputSettings,
}

/// A single parameter edit coming from an interactive control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterChange {
    Views(u32),
    Resolution(u32),
    Aperture(f32),
    FocalDistance(f32),
}

impl fmt::Display for ParameterChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterChange::Views(value) => write!(f, "views={value}"),
            ParameterChange::Resolution(value) => write!(f, "resolution={value}"),
            ParameterChange::Aperture(value) => write!(f, "aperture={value:.3}"),
            ParameterChange::FocalDistance(value) => write!(f, "focal_distance={value:.3}"),
        }
    }
}

fn deserialize_tone_mapping<'de, D>(deserializer: D) -> Result<ToneMapping, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Bool(bool),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Bool(true) => Ok(ToneMapping::Aces),
        Helper::Bool(false) => Ok(ToneMapping::None),
        Helper::Str(raw) => parse_tone_mapping(&raw).map_err(de::Error::custom),
    }
}

pub fn parse_tone_mapping(raw: &str) -> Result<ToneMapping, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "aces" | "filmic" | "on" => Ok(ToneMapping::Aces),
        "none" | "off" | "linear" => Ok(ToneMapping::None),
        other => Err(format!("invalid tone mapping '{other}'")),
    }
}

impl LightFieldConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LightFieldConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), views = config.array.views, resolution = config.array.resolution, "loaded light-field config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns a validated copy with `change` applied; `self` is never modified.
    pub fn with_change(&self, change: ParameterChange) -> Result<Self, ConfigError> {
        self.with_changes([change])
    }

    /// Applies all changes first and validates once, so that combined edits
    /// (e.g. views and resolution under exact tiling) are judged together.
    pub fn with_changes<I>(&self, changes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ParameterChange>,
    {
        let mut next = self.clone();
        for change in changes {
            match change {
                ParameterChange::Views(value) => next.array.views = value,
                ParameterChange::Resolution(value) => next.array.resolution = value,
                ParameterChange::Aperture(value) => next.array.aperture = value,
                ParameterChange::FocalDistance(value) => next.array.focal_distance = value,
            }
        }
        next.validate()?;
        Ok(next)
    }

    /// Number of sub-cameras, `views²`.
    pub fn camera_count(&self) -> u32 {
        self.array.views * self.array.views
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let array = &self.array;
        if !(MIN_VIEWS..=MAX_VIEWS).contains(&array.views) {
            return Err(ConfigError::Invalid(format!(
                "array.views must be within {MIN_VIEWS}..={MAX_VIEWS} (got {})",
                array.views
            )));
        }

        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&array.resolution) {
            return Err(ConfigError::Invalid(format!(
                "array.resolution must be within {MIN_RESOLUTION}..={MAX_RESOLUTION} (got {})",
                array.resolution
            )));
        }

        if array.resolution % RESOLUTION_STEP != 0 {
            return Err(ConfigError::Invalid(format!(
                "array.resolution must be a multiple of {RESOLUTION_STEP} (got {})",
                array.resolution
            )));
        }

        if array.tiling == TilingPolicy::Exact && array.resolution % array.views != 0 {
            return Err(ConfigError::Invalid(format!(
                "array.resolution {} is not divisible by array.views {} under exact tiling",
                array.resolution, array.views
            )));
        }

        if !array.aperture.is_finite() || !(0.0..=MAX_APERTURE).contains(&array.aperture) {
            return Err(ConfigError::Invalid(format!(
                "array.aperture must be within 0..={MAX_APERTURE} (got {})",
                array.aperture
            )));
        }

        if !array.focal_distance.is_finite()
            || array.focal_distance <= 0.0
            || array.focal_distance > MAX_FOCAL_DISTANCE
        {
            return Err(ConfigError::Invalid(format!(
                "array.focal_distance must be > 0 and <= {MAX_FOCAL_DISTANCE} (got {})",
                array.focal_distance
            )));
        }

        let lens = &self.lens;
        if !lens.near.is_finite() || lens.near <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lens.near must be > 0 (got {})",
                lens.near
            )));
        }

        if !lens.far.is_finite() || lens.far <= lens.near {
            return Err(ConfigError::Invalid(format!(
                "lens.far must be greater than lens.near (got near={}, far={})",
                lens.near, lens.far
            )));
        }

        if !lens.frame_half_extent.is_finite() || lens.frame_half_extent <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lens.frame_half_extent must be > 0 (got {})",
                lens.frame_half_extent
            )));
        }

        if !self.output.exposure.is_finite() || self.output.exposure <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "output.exposure must be > 0 (got {})",
                self.output.exposure
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[array]
views = 3
resolution = 768
aperture = 0.08
focal_distance = 2.5
tiling = "exact"

[lens]
near = 0.05
far = 20.0

[output]
tone_mapping = "none"
exposure = 1.5
"#;

    #[test]
    fn parses_sample_config() {
        let config = LightFieldConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.array.views, 3);
        assert_eq!(config.array.resolution, 768);
        assert_eq!(config.array.tiling, TilingPolicy::Exact);
        assert_eq!(config.lens.far, 20.0);
        assert_eq!(config.lens.frame_half_extent, 0.6);
        assert_eq!(config.output.tone_mapping, ToneMapping::None);
        assert_eq!(config.camera_count(), 9);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = LightFieldConfig::from_toml_str("").expect("parse empty");
        assert_eq!(config, LightFieldConfig::default());
        assert_eq!(config.array.views, 4);
        assert_eq!(config.array.resolution, 4096);
        assert_eq!(config.array.aperture, 0.05);
        assert_eq!(config.array.focal_distance, 1.73);
    }

    #[test]
    fn tone_mapping_accepts_booleans() {
        let config =
            LightFieldConfig::from_toml_str("[output]\ntone_mapping = false\n").expect("parse");
        assert_eq!(config.output.tone_mapping, ToneMapping::None);
        let err = LightFieldConfig::from_toml_str("[output]\ntone_mapping = \"sepia\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = LightFieldConfig::default();
        for change in [
            ParameterChange::Views(0),
            ParameterChange::Views(11),
            ParameterChange::Resolution(128),
            ParameterChange::Resolution(8192),
            ParameterChange::Resolution(300),
            ParameterChange::Aperture(-0.01),
            ParameterChange::Aperture(f32::NAN),
            ParameterChange::FocalDistance(0.0),
            ParameterChange::FocalDistance(f32::INFINITY),
        ] {
            let err = base.with_change(change).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{change} accepted");
        }
    }

    #[test]
    fn rejected_change_leaves_config_untouched() {
        let base = LightFieldConfig::default();
        let snapshot = base.clone();
        assert!(base.with_change(ParameterChange::Views(0)).is_err());
        assert_eq!(base, snapshot);

        let next = base
            .with_change(ParameterChange::Resolution(1024))
            .expect("valid change");
        assert_eq!(next.array.resolution, 1024);
        assert_eq!(base.array.resolution, 4096);
    }

    #[test]
    fn exact_tiling_requires_divisible_resolution() {
        let mut config = LightFieldConfig::default();
        config.array.tiling = TilingPolicy::Exact;
        assert!(config.with_change(ParameterChange::Views(3)).is_err());
        let combined = config
            .with_changes([ParameterChange::Views(3), ParameterChange::Resolution(768)])
            .expect("combined change is divisible");
        assert_eq!(combined.array.views, 3);

        config.array.tiling = TilingPolicy::Overlap;
        assert!(config.with_change(ParameterChange::Views(3)).is_ok());
    }

    #[test]
    fn rejects_resolution_off_the_step_grid() {
        let err = LightFieldConfig::from_toml_str("[array]\nresolution = 300\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("multiple of 256")));
        assert!(LightFieldConfig::from_toml_str("[array]\nresolution = 1280\n").is_ok());
    }

    #[test]
    fn rejects_inverted_clip_planes() {
        let err = LightFieldConfig::from_toml_str("[lens]\nnear = 5.0\nfar = 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn serialised_config_parses_back() {
        let config = LightFieldConfig::from_toml_str(SAMPLE).expect("parse config");
        let text = config.to_toml_string().expect("serialise");
        let reparsed = LightFieldConfig::from_toml_str(&text).expect("reparse");
        assert_eq!(reparsed, config);
    }
}
