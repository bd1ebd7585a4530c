//! Configuration for growthlab-core
//!
//! Detection thresholds come from a closed set of named presets, optionally
//! overridden field by field. A full analysis configuration can be loaded
//! from TOML:
//!
//! ```toml
//! preset = "conservative"
//! filtering_level = "criticalAndHigh"
//! model_view = "pointFiltered"
//!
//! [detection]
//! max_growth_rate = 0.8
//!
//! [parallel]
//! enabled = true
//! chunk_size = 64
//! min_subjects = 256
//!
//! [comparison]
//! min_samples = 2
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::filtering::FilteringLevel;

/// Named detection presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum OutlierPreset {
    UltraConservative,
    Conservative,
    Moderate,
}

impl OutlierPreset {
    pub const ALL: [OutlierPreset; 3] = [Self::UltraConservative, Self::Conservative, Self::Moderate];

    pub fn name(&self) -> &'static str {
        match self {
            Self::UltraConservative => "ultraConservative",
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
        }
    }

    /// Thresholds this preset stands for
    pub fn config(&self) -> OutlierConfig {
        match self {
            Self::UltraConservative => OutlierConfig {
                max_growth_rate: 1.0,
                max_decline_rate: 0.5,
                iqr_sensitivity: 3.0,
                min_group_size_for_iqr: 5,
            },
            Self::Conservative => OutlierConfig {
                max_growth_rate: 0.7,
                max_decline_rate: 0.35,
                iqr_sensitivity: 2.0,
                min_group_size_for_iqr: 4,
            },
            Self::Moderate => OutlierConfig {
                max_growth_rate: 0.5,
                max_decline_rate: 0.25,
                iqr_sensitivity: 1.5,
                min_group_size_for_iqr: 3,
            },
        }
    }
}

impl FromStr for OutlierPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

impl std::fmt::Display for OutlierPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Thresholds for the outlier detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct OutlierConfig {
    /// Largest allowed |r| between consecutive rising points (per day)
    pub max_growth_rate: f64,
    /// Largest allowed |r| between consecutive falling points (per day)
    pub max_decline_rate: f64,
    /// `k` in `[Q1 - k*IQR, Q3 + k*IQR]`
    pub iqr_sensitivity: f64,
    /// Minimum number of subjects a group needs for the cross-subject pass
    pub min_group_size_for_iqr: u32,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        OutlierPreset::Conservative.config()
    }
}

impl OutlierConfig {
    /// Resolve a preset by name
    pub fn from_preset_name(name: &str) -> ConfigResult<Self> {
        Ok(name.parse::<OutlierPreset>()?.config())
    }

    /// Reject thresholds that would make detection meaningless
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.max_growth_rate.is_finite() && self.max_growth_rate > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "max_growth_rate",
                message: format!("must be positive, got {}", self.max_growth_rate),
            });
        }
        if !(self.max_decline_rate.is_finite() && self.max_decline_rate > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "max_decline_rate",
                message: format!("must be positive, got {}", self.max_decline_rate),
            });
        }
        if !(self.iqr_sensitivity.is_finite() && self.iqr_sensitivity >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "iqr_sensitivity",
                message: format!("must be non-negative, got {}", self.iqr_sensitivity),
            });
        }
        if self.min_group_size_for_iqr == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_group_size_for_iqr",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Which dataset view feeds the growth models and matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelView {
    /// All subjects, all points
    Complete,
    /// Subjects with an excluded flag removed entirely
    SubjectFiltered,
    /// Excluded points removed, short series dropped
    #[default]
    PointFiltered,
}

/// Parallel pathway settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Use the batch supervisor at all
    pub enabled: bool,
    /// Subjects per detection batch
    pub chunk_size: usize,
    /// Below this many subjects the synchronous path is used
    pub min_subjects: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size: 64,
            min_subjects: 256,
        }
    }
}

/// Group comparison settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Smallest per-side sample size for a comparison to be reported
    pub min_samples: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self { min_samples: 2 }
    }
}

/// Everything `analysis::run` needs besides the subjects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Preset the detection thresholds started from, if any
    pub preset: Option<OutlierPreset>,
    pub detection: OutlierConfig,
    pub filtering_level: FilteringLevel,
    pub model_view: ModelView,
    pub parallel: ParallelConfig,
    pub comparison: ComparisonConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_preset(OutlierPreset::Conservative)
    }
}

impl AnalysisConfig {
    /// Defaults with detection thresholds from `preset`
    pub fn from_preset(preset: OutlierPreset) -> Self {
        Self {
            preset: Some(preset),
            detection: preset.config(),
            filtering_level: FilteringLevel::CriticalAndHigh,
            model_view: ModelView::default(),
            parallel: ParallelConfig::default(),
            comparison: ComparisonConfig::default(),
        }
    }

    /// Parse a TOML configuration
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let file: TomlAnalysisConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.resolve()
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.detection.validate()?;
        if self.parallel.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallel.chunk_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.comparison.min_samples == 0 {
            return Err(ConfigError::InvalidValue {
                field: "comparison.min_samples",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// TOML representation of an analysis configuration
///
/// Preset and level names are kept as strings so unknown names surface as
/// [`ConfigError::UnknownPreset`] / [`ConfigError::UnknownFilteringLevel`].
#[derive(Debug, Deserialize, Default)]
struct TomlAnalysisConfig {
    #[serde(default)]
    preset: Option<String>,
    #[serde(default)]
    filtering_level: Option<String>,
    #[serde(default)]
    model_view: Option<ModelView>,
    #[serde(default)]
    detection: TomlDetection,
    #[serde(default)]
    parallel: ParallelConfig,
    #[serde(default)]
    comparison: ComparisonConfig,
}

/// Field-by-field overrides of the preset thresholds
#[derive(Debug, Deserialize, Default)]
struct TomlDetection {
    max_growth_rate: Option<f64>,
    max_decline_rate: Option<f64>,
    iqr_sensitivity: Option<f64>,
    min_group_size_for_iqr: Option<u32>,
}

impl TomlAnalysisConfig {
    fn resolve(self) -> ConfigResult<AnalysisConfig> {
        let preset = self
            .preset
            .as_deref()
            .map(str::parse::<OutlierPreset>)
            .transpose()?;
        let base = preset.unwrap_or(OutlierPreset::Conservative).config();

        let detection = OutlierConfig {
            max_growth_rate: self.detection.max_growth_rate.unwrap_or(base.max_growth_rate),
            max_decline_rate: self.detection.max_decline_rate.unwrap_or(base.max_decline_rate),
            iqr_sensitivity: self.detection.iqr_sensitivity.unwrap_or(base.iqr_sensitivity),
            min_group_size_for_iqr: self
                .detection
                .min_group_size_for_iqr
                .unwrap_or(base.min_group_size_for_iqr),
        };

        let filtering_level = match self.filtering_level.as_deref() {
            Some(name) => name.parse()?,
            None => FilteringLevel::CriticalAndHigh,
        };

        let config = AnalysisConfig {
            preset,
            detection,
            filtering_level,
            model_view: self.model_view.unwrap_or_default(),
            parallel: self.parallel,
            comparison: self.comparison,
        };
        config.validate()?;
        Ok(config)
    }
}
