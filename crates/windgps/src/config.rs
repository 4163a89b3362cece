//! Configuration management for windgps.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::clock::{RansacConfig, DEFAULT_MAX_TRIALS, DEFAULT_RESIDUAL_THRESHOLD};
use crate::codec::layout::DEFAULT_MAX_ATTEMPTS;
use crate::codec::{BlockGeometry, DEFAULT_WIND_TEXT_LEN};
use crate::error::{Error, Result};
use crate::wind::DEFAULT_KEYS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "windgps";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "windgps.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WINDGPS_`, sections split on `__`)
/// 2. TOML config file at `~/.config/windgps/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input file discovery.
    pub input: InputConfig,
    /// Nominal block layout and discovery bounds.
    pub layout: LayoutConfig,
    /// Clock reconciliation.
    pub clock: ClockConfig,
    /// Wind text extraction.
    pub wind: WindConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Input file discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Substring a file name must contain.
    pub contains: String,
    /// Substrings that exclude a file name.
    pub excludes: Vec<String>,
}

/// Block layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Nominal records per block, used to seed discovery.
    pub records_per_block: u32,
    /// Nominal padding bytes per block, used to seed discovery.
    pub padding_bytes: u32,
    /// Maximum padding candidates tried by discovery.
    pub max_attempts: u32,
    /// Width of the wind text buffer in each record.
    pub wind_text_len: usize,
    /// Rediscover the layout for every file instead of only the first.
    pub revalidate_per_file: bool,
}

/// Clock reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Calendar year the capture was recorded in.
    /// Must be set here or on the command line before processing.
    pub expected_year: Option<i32>,
    /// Century base added to the two-digit GPS year.
    pub base_year: i32,
    /// Largest residual, in seconds, of an inlier anchor.
    pub residual_threshold: f64,
    /// Candidate lines tried by outlier rejection.
    pub max_trials: usize,
    /// Seed of the candidate sampler.
    pub seed: u64,
}

/// Wind text configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    /// Labels extracted per sample, in output column order.
    pub keys: Vec<String>,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/windgps/windgps.db`
    pub database_path: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            contains: ".bin".to_string(),
            excludes: vec!["~".to_string(), ".pyc".to_string()],
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            records_per_block: 5,
            padding_bytes: 90,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wind_text_len: DEFAULT_WIND_TEXT_LEN,
            revalidate_per_file: false,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            expected_year: None,
            base_year: 2000,
            residual_threshold: DEFAULT_RESIDUAL_THRESHOLD,
            max_trials: DEFAULT_MAX_TRIALS,
            seed: 0,
        }
    }
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl LayoutConfig {
    /// The nominal geometry that seeds discovery.
    #[must_use]
    pub fn nominal_geometry(&self) -> BlockGeometry {
        BlockGeometry::new(self.records_per_block, self.padding_bytes)
    }
}

impl ClockConfig {
    /// Parameters for outlier rejection.
    #[must_use]
    pub fn ransac(&self) -> RansacConfig {
        RansacConfig {
            residual_threshold: self.residual_threshold,
            max_trials: self.max_trials,
            seed: self.seed,
        }
    }
}

impl Config {
    /// Load configuration, reading `config_path` or the default config file.
    ///
    /// Later sources override earlier ones: defaults, then the TOML file if it
    /// exists, then `WINDGPS_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WINDGPS_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.input.contains.is_empty() {
            return Err(Error::config_validation("input.contains must not be empty"));
        }

        if self.layout.records_per_block == 0 {
            return Err(Error::config_validation("records_per_block must be greater than 0"));
        }
        if self.layout.max_attempts == 0 {
            return Err(Error::config_validation("max_attempts must be greater than 0"));
        }
        if self.layout.wind_text_len == 0 {
            return Err(Error::config_validation("wind_text_len must be greater than 0"));
        }

        let threshold = self.clock.residual_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::config_validation(format!(
                "residual_threshold must be a positive number, got {threshold}"
            )));
        }
        if self.clock.max_trials == 0 {
            return Err(Error::config_validation("max_trials must be greater than 0"));
        }

        if self.wind.keys.is_empty() {
            return Err(Error::config_validation("wind.keys must not be empty"));
        }
        for key in &self.wind.keys {
            if key.is_empty() || key.contains(' ') {
                return Err(Error::config_validation(format!("invalid wind key: {key:?}")));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// The expected capture year.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no year has been configured.
    pub fn expected_year(&self) -> Result<i32> {
        self.clock.expected_year.ok_or_else(|| {
            Error::config_validation(
                "clock.expected_year is not set (use --year or WINDGPS_CLOCK__EXPECTED_YEAR)",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.input.contains, ".bin");
        assert_eq!(config.layout.nominal_geometry(), BlockGeometry::new(5, 90));
        assert!(!config.layout.revalidate_per_file);
        assert!(config.clock.expected_year.is_none());
        assert_eq!(config.wind.keys, vec!["S2", "D"]);
    }

    #[test]
    fn test_default_input_config() {
        let input = InputConfig::default();
        assert_eq!(input.excludes, vec!["~", ".pyc"]);
    }

    #[test]
    fn test_default_layout_config() {
        let layout = LayoutConfig::default();

        assert_eq!(layout.records_per_block, 5);
        assert_eq!(layout.padding_bytes, 90);
        assert_eq!(layout.max_attempts, 64);
        assert_eq!(layout.wind_text_len, 128);
    }

    #[test]
    fn test_default_clock_config() {
        let clock = ClockConfig::default();

        assert_eq!(clock.base_year, 2000);
        assert!((clock.residual_threshold - 0.08).abs() < f64::EPSILON);
        assert_eq!(clock.max_trials, 100);
        assert_eq!(clock.seed, 0);
        assert_eq!(clock.ransac(), RansacConfig::default());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_records_per_block() {
        let mut config = Config::default();
        config.layout.records_per_block = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("records_per_block"));
    }

    #[test]
    fn test_validate_zero_max_attempts() {
        let mut config = Config::default();
        config.layout.max_attempts = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_attempts"));
    }

    #[test]
    fn test_validate_zero_wind_text_len() {
        let mut config = Config::default();
        config.layout.wind_text_len = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_threshold() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.clock.residual_threshold = threshold;

            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("residual_threshold"), "{threshold}");
        }
    }

    #[test]
    fn test_validate_zero_max_trials() {
        let mut config = Config::default();
        config.clock.max_trials = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_contains() {
        let mut config = Config::default();
        config.input.contains = String::new();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_wind_keys() {
        let mut config = Config::default();
        config.wind.keys = Vec::new();
        assert!(config.validate().is_err());

        config.wind.keys = vec!["S2".to_string(), "wind speed".to_string()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("wind speed"));
    }

    #[test]
    fn test_expected_year() {
        let mut config = Config::default();
        assert!(matches!(
            config.expected_year(),
            Err(Error::ConfigValidation { .. })
        ));

        config.clock.expected_year = Some(2021);
        assert_eq!(config.expected_year().unwrap(), 2021);
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("windgps.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("windgps"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_data_dir() {
        let path = Config::default_data_dir();
        assert!(path.to_string_lossy().contains("windgps"));
    }

    fn load_in_jail(path: &str) -> std::result::Result<Config, figment::Error> {
        Config::load_from(Some(PathBuf::from(path))).map_err(|e| e.to_string().into())
    }

    #[test]
    fn test_load_nonexistent_config() {
        figment::Jail::expect_with(|_jail| {
            let config = load_in_jail("missing.toml")?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "windgps.toml",
                r#"
                [layout]
                padding_bytes = 95

                [clock]
                expected_year = 2021
                seed = 42

                [wind]
                keys = ["S2"]
                "#,
            )?;

            let config = load_in_jail("windgps.toml")?;
            assert_eq!(config.layout.padding_bytes, 95);
            assert_eq!(config.layout.records_per_block, 5);
            assert_eq!(config.clock.expected_year, Some(2021));
            assert_eq!(config.expected_year().ok(), Some(2021));
            assert_eq!(config.clock.seed, 42);
            assert_eq!(config.wind.keys, vec!["S2"]);
            Ok(())
        });
    }

    #[test]
    fn test_load_invalid_toml_value_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("windgps.toml", "[layout]\nrecords_per_block = 0\n")?;

            let err = Config::load_from(Some(PathBuf::from("windgps.toml"))).unwrap_err();
            assert!(matches!(err, Error::ConfigValidation { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "windgps.toml",
                "[clock]\nexpected_year = 2021\nseed = 42\n\n[layout]\npadding_bytes = 95\n",
            )?;
            jail.set_env("WINDGPS_CLOCK__EXPECTED_YEAR", "2022");
            jail.set_env("WINDGPS_LAYOUT__RECORDS_PER_BLOCK", "8");

            let config = load_in_jail("windgps.toml")?;
            assert_eq!(config.clock.expected_year, Some(2022));
            assert_eq!(config.clock.seed, 42);
            assert_eq!(config.layout.nominal_geometry(), BlockGeometry::new(8, 95));
            Ok(())
        });
    }

    #[test]
    fn test_env_value_is_validated() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WINDGPS_CLOCK__MAX_TRIALS", "0");

            let err = Config::load_from(Some(PathBuf::from("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("max_trials"));
            Ok(())
        });
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("residual_threshold"));
        assert!(json.contains("revalidate_per_file"));
    }

    #[test]
    fn test_layout_config_deserialize() {
        let json = r#"{"records_per_block": 10, "padding_bytes": 3}"#;
        let layout: LayoutConfig = serde_json::from_str(json).unwrap();
        assert_eq!(layout.nominal_geometry(), BlockGeometry::new(10, 3));
        assert_eq!(layout.max_attempts, 64);
    }
}
