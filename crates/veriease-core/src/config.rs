//! Engine configuration: TOML file with `VERIEASE_*` environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub liveness: LivenessConfig,
    pub glasses: GlassesConfig,
    pub matcher: MatcherConfig,
}

/// Movement-window liveness parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Movements needed inside one window to count as live.
    pub required_movements: u32,
    /// Window length in seconds, measured from the first movement.
    pub movement_interval_secs: f64,
    /// An eye with EAR strictly below this is closed.
    pub blink_ear_threshold: f32,
    /// Absolute yaw (radians) strictly above this is a tilt.
    pub tilt_yaw_threshold: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            required_movements: 3,
            movement_interval_secs: 3.0,
            blink_ear_threshold: 0.1,
            tilt_yaw_threshold: 0.5,
        }
    }
}

impl LivenessConfig {
    pub fn movement_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.movement_interval_secs)
            .unwrap_or_else(|_| Duration::from_secs(3))
    }
}

/// Inclusive input range mapped onto `[0, 1]` by [`crate::geometry::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f32,
    pub max: f32,
}

impl ScoreRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn check(&self, name: &str) -> Result<(), ConfigError> {
        if self.min.is_finite() && self.max.is_finite() && self.min < self.max {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "{name} must be finite with min < max, got [{}, {}]",
                self.min, self.max
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlassesPolicy {
    /// Eye/eyebrow geometry, frame width and brightness fused with positional weights.
    #[default]
    #[serde(rename = "weighted")]
    WeightedSignals,
    /// Inter-eye width alone compared against `frame_width_ratio`.
    #[serde(rename = "inter-eye-width")]
    InterEyeWidth,
}

impl FromStr for GlassesPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(Self::WeightedSignals),
            "inter-eye-width" => Ok(Self::InterEyeWidth),
            other => Err(ConfigError::Invalid(format!("unknown glasses policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlassesConfig {
    pub policy: GlassesPolicy,
    /// Confidence at or above which glasses are reported.
    pub min_confidence: f32,
    /// Eye-to-eyebrow centroid distance range.
    pub geometry_range: ScoreRange,
    /// Inter-eye width range.
    pub frame_width_range: ScoreRange,
    /// Positional weights applied to whichever scores are present, in order.
    pub weights: Vec<f32>,
    /// Whether `detect` fills the brightness slot with `brightness_placeholder`.
    pub brightness_enabled: bool,
    /// Brightness signal used when the caller supplies none.
    pub brightness_placeholder: f32,
    /// Raw inter-eye width threshold for [`GlassesPolicy::InterEyeWidth`].
    pub frame_width_ratio: f32,
}

impl Default for GlassesConfig {
    fn default() -> Self {
        Self {
            policy: GlassesPolicy::WeightedSignals,
            min_confidence: 0.4,
            geometry_range: ScoreRange::new(0.05, 0.15),
            frame_width_range: ScoreRange::new(0.2, 0.4),
            weights: vec![0.4, 0.4, 0.2],
            brightness_enabled: true,
            brightness_placeholder: 0.8,
            frame_width_ratio: 0.15,
        }
    }
}

impl GlassesConfig {
    /// Brightness used by [`crate::GlassesHeuristic::detect`], `None` when the slot is off.
    pub fn brightness_signal(&self) -> Option<f32> {
        self.brightness_enabled.then_some(self.brightness_placeholder)
    }
}


fn default_region_tolerance() -> f32 {
    0.04
}

fn default_required_fraction() -> f32 {
    0.75
}

fn default_axis_tolerance() -> f32 {
    0.05
}

/// How two observations are judged to be the same face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Eight regions compared by mean point distance; a fraction of them must pass.
    RegionAverage {
        #[serde(default = "default_region_tolerance")]
        tolerance: f32,
        #[serde(default = "default_required_fraction")]
        required_fraction: f32,
    },
    /// Nose, eyes and pupils must all pass a per-axis tolerance on every point.
    StrictPerAxis {
        #[serde(default = "default_axis_tolerance")]
        tolerance: f32,
    },
}

impl MatchPolicy {
    pub fn region_average() -> Self {
        Self::RegionAverage {
            tolerance: default_region_tolerance(),
            required_fraction: default_required_fraction(),
        }
    }

    pub fn strict_per_axis() -> Self {
        Self::StrictPerAxis {
            tolerance: default_axis_tolerance(),
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::region_average()
    }
}

impl FromStr for MatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region-average" => Ok(Self::region_average()),
            "strict-per-axis" => Ok(Self::strict_per_axis()),
            other => Err(ConfigError::Invalid(format!("unknown match policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub policy: MatchPolicy,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `VERIEASE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numbers keep the current value; unknown policy names are an error.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let l = &mut self.liveness;
        l.required_movements = env_parse(&lookup, "VERIEASE_REQUIRED_MOVEMENTS", l.required_movements);
        l.movement_interval_secs =
            env_parse(&lookup, "VERIEASE_MOVEMENT_INTERVAL_SECS", l.movement_interval_secs);
        l.blink_ear_threshold =
            env_parse(&lookup, "VERIEASE_BLINK_EAR_THRESHOLD", l.blink_ear_threshold);
        l.tilt_yaw_threshold = env_parse(&lookup, "VERIEASE_TILT_YAW_THRESHOLD", l.tilt_yaw_threshold);

        self.glasses.min_confidence =
            env_parse(&lookup, "VERIEASE_GLASSES_MIN_CONFIDENCE", self.glasses.min_confidence);

        if let Some(v) = lookup("VERIEASE_MATCH_POLICY") {
            self.matcher.policy = v.trim().parse()?;
        }
        if let Some(v) = lookup("VERIEASE_GLASSES_POLICY") {
            self.glasses.policy = v.trim().parse()?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.liveness;
        finite("blink_ear_threshold", l.blink_ear_threshold)?;
        finite("tilt_yaw_threshold", l.tilt_yaw_threshold)?;
        if l.required_movements == 0 {
            return Err(ConfigError::Invalid("required_movements must be at least 1".into()));
        }
        if !(l.movement_interval_secs.is_finite() && l.movement_interval_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "movement_interval_secs must be positive, got {}",
                l.movement_interval_secs
            )));
        }

        let g = &self.glasses;
        g.geometry_range.check("geometry_range")?;
        g.frame_width_range.check("frame_width_range")?;
        finite("frame_width_ratio", g.frame_width_ratio)?;
        finite("brightness_placeholder", g.brightness_placeholder)?;
        if !(0.0..=1.0).contains(&g.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "glasses min_confidence must be in [0, 1], got {}",
                g.min_confidence
            )));
        }
        if g.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid("glasses weights must be non-negative".into()));
        }

        match self.matcher.policy {
            MatchPolicy::RegionAverage {
                tolerance,
                required_fraction,
            } => {
                check_tolerance(tolerance)?;
                if !(required_fraction > 0.0 && required_fraction <= 1.0) {
                    return Err(ConfigError::Invalid(format!(
                        "required_fraction must be in (0, 1], got {required_fraction}"
                    )));
                }
            }
            MatchPolicy::StrictPerAxis { tolerance } => check_tolerance(tolerance)?,
        }

        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn finite(name: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be finite, got {value}")))
    }
}

fn check_tolerance(tolerance: f32) -> Result<(), ConfigError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "match tolerance must be finite and >= 0, got {tolerance}"
        )))
    }
}

fn env_parse<T, F>(lookup: &F, key: &str, current: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.liveness.required_movements, 3);
        assert_eq!(c.liveness.movement_interval(), Duration::from_secs(3));
        assert_eq!(c.glasses.weights, vec![0.4, 0.4, 0.2]);
        assert_eq!(c.matcher.policy, MatchPolicy::region_average());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let c = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(c, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let c = EngineConfig::from_toml_str(
            r#"
            [liveness]
            required_movements = 5

            [matcher.policy]
            mode = "strict-per-axis"
            "#,
        )
        .unwrap();
        assert_eq!(c.liveness.required_movements, 5);
        assert_eq!(c.liveness.movement_interval_secs, 3.0);
        assert_eq!(c.matcher.policy, MatchPolicy::StrictPerAxis { tolerance: 0.05 });
    }

    #[test]
    fn test_glasses_policy_toml() {
        let c = EngineConfig::from_toml_str(
            r#"
            [glasses]
            policy = "inter-eye-width"
            "#,
        )
        .unwrap();
        assert_eq!(c.glasses.policy, GlassesPolicy::InterEyeWidth);
        assert_eq!(c.glasses.min_confidence, 0.4);
    }

    #[test]
    fn test_rejects_zero_movements() {
        let err = EngineConfig::from_toml_str("[liveness]\nrequired_movements = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        let err = EngineConfig::from_toml_str("[liveness\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut c = EngineConfig::default();
        c.apply_env_from(lookup(&[
            ("VERIEASE_REQUIRED_MOVEMENTS", "4"),
            ("VERIEASE_MOVEMENT_INTERVAL_SECS", "2.5"),
            ("VERIEASE_MATCH_POLICY", "strict-per-axis"),
            ("VERIEASE_GLASSES_POLICY", "inter-eye-width"),
        ]))
        .unwrap();
        assert_eq!(c.liveness.required_movements, 4);
        assert_eq!(c.liveness.movement_interval(), Duration::from_millis(2500));
        assert_eq!(c.matcher.policy, MatchPolicy::strict_per_axis());
        assert_eq!(c.glasses.policy, GlassesPolicy::InterEyeWidth);
    }

    #[test]
    fn test_env_unparseable_number_keeps_value() {
        let mut c = EngineConfig::default();
        c.apply_env_from(lookup(&[("VERIEASE_BLINK_EAR_THRESHOLD", "abc")]))
            .unwrap();
        assert_eq!(c.liveness.blink_ear_threshold, 0.1);
    }

    #[test]
    fn test_env_unknown_policy_is_error() {
        let mut c = EngineConfig::default();
        let err = c
            .apply_env_from(lookup(&[("VERIEASE_MATCH_POLICY", "lenient")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/veriease.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_toml_string_reparses() {
        let mut c = EngineConfig::default();
        c.matcher.policy = MatchPolicy::strict_per_axis();
        let s = c.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&s).unwrap(), c);

        c.glasses.brightness_enabled = false;
        let s = c.to_toml_string().unwrap();
        let reparsed = EngineConfig::from_toml_str(&s).unwrap();
        assert_eq!(reparsed, c);
        assert_eq!(reparsed.glasses.brightness_signal(), None);
    }

    #[test]
    fn test_brightness_signal() {
        let mut g = GlassesConfig::default();
        assert_eq!(g.brightness_signal(), Some(0.8));
        g.brightness_enabled = false;
        assert_eq!(g.brightness_signal(), None);

        let c = EngineConfig::from_toml_str("[glasses]\nbrightness_enabled = false\n").unwrap();
        assert_eq!(c.glasses.brightness_signal(), None);
    }

    #[test]
    fn test_rejects_nan_tolerance() {
        let err = EngineConfig::from_toml_str(
            "[matcher.policy]\nmode = \"strict-per-axis\"\ntolerance = nan\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str(
            "[matcher.policy]\nmode = \"region-average\"\ntolerance = nan\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_non_finite_thresholds() {
        for src in [
            "[liveness]\nblink_ear_threshold = nan\n",
            "[liveness]\ntilt_yaw_threshold = inf\n",
            "[glasses]\nframe_width_ratio = nan\n",
        ] {
            let err = EngineConfig::from_toml_str(src).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{src}");
        }
    }

    #[test]
    fn test_rejects_inverted_ranges() {
        let err = EngineConfig::from_toml_str(
            "[glasses]\ngeometry_range = { min = 0.15, max = 0.05 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str(
            "[glasses]\nframe_width_range = { min = 0.2, max = nan }\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
