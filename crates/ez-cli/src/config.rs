//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use ez_core::{EpisodeNormalizer, ExclusionRule, RegionConfig, RegionSettings, ValidationError};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Buffer, padding and minimum-stay durations in days.
    #[serde(default)]
    pub regions: RegionSettings,

    /// Rules rejecting episodes before segmentation.
    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("regions", &self.regions)
            .field("exclusions", &self.exclusions.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("ez.db"),
            regions: RegionSettings::default(),
            exclusions: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (EZ_*, nested with __)
        figment = figment.merge(Env::prefixed("EZ_").split("__"));

        figment.extract()
    }

    /// Validates the `[regions]` table.
    pub fn region_config(&self) -> Result<RegionConfig, ValidationError> {
        self.regions.validate()
    }

    /// Compiles the `[[exclusions]]` rules.
    pub fn normalizer(&self) -> Result<EpisodeNormalizer, ValidationError> {
        EpisodeNormalizer::new(&self.exclusions)
    }
}

/// Returns the platform-specific config directory for ez.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ez"))
}

/// Returns the platform-specific data directory for ez.
///
/// On Linux: `~/.local/share/ez`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ez"))
}
