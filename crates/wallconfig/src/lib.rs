use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level `config.toml` contents.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WallConfig {
    pub version: u32,
    #[serde(default)]
    pub effects: EffectsSection,
    #[serde(default)]
    pub pacing: PacingSection,
    #[serde(default)]
    pub surfaces: SurfaceSection,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            effects: EffectsSection::default(),
            pacing: PacingSection::default(),
            surfaces: SurfaceSection::default(),
        }
    }
}

/// Effect selection defaults; names may be stable names or short aliases.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EffectsSection {
    pub default: Option<String>,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PacingSection {
    pub high_rate: f64,
    pub low_rate: f64,
    pub occlusion_threshold: f64,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub sample_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub activation_delay: Duration,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            high_rate: 30.0,
            low_rate: 10.0,
            occlusion_threshold: 0.4,
            sample_interval: Duration::from_secs(2),
            activation_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SurfaceSection {
    pub resize_pixel_threshold: u32,
    pub resize_aspect_tolerance: f64,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub guard_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub resume_debounce: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub display_poll_interval: Duration,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            resize_pixel_threshold: 4,
            resize_aspect_tolerance: 0.01,
            guard_timeout: Duration::from_millis(40),
            resume_debounce: Duration::from_secs(1),
            display_poll_interval: Duration::from_secs(1),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl WallConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: WallConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Loads `path`, returning defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }
        self.pacing.validate()?;
        self.surfaces.validate()?;
        for (key, value) in [
            ("effects.default", &self.effects.default),
            ("effects.fallback", &self.effects.fallback),
        ] {
            if value.as_deref().is_some_and(|name| name.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

impl PacingSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.high_rate > 0.0 && self.low_rate > 0.0) {
            return Err(ConfigError::Invalid(
                "pacing rates must be positive".to_string(),
            ));
        }
        if self.low_rate > self.high_rate {
            return Err(ConfigError::Invalid(format!(
                "pacing.low_rate ({}) exceeds pacing.high_rate ({})",
                self.low_rate, self.high_rate
            )));
        }
        if !(self.occlusion_threshold > 0.0 && self.occlusion_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pacing.occlusion_threshold must be in (0, 1], got {}",
                self.occlusion_threshold
            )));
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "pacing.sample_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl SurfaceSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.resize_aspect_tolerance) {
            return Err(ConfigError::Invalid(format!(
                "surfaces.resize_aspect_tolerance must be in [0, 1), got {}",
                self.resize_aspect_tolerance
            )));
        }
        if self.guard_timeout.is_zero() || self.display_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "surfaces.guard_timeout and surfaces.display_poll_interval must be non-zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
