//! Analysis configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::items::AbilityGrid;
use crate::tutors::TutorPolicy;

/// Tunables for an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Tutor eligibility thresholds and list length.
    #[serde(default)]
    pub tutors: TutorPolicy,
    /// Grid used for item characteristic curves.
    #[serde(default)]
    pub icc_grid: AbilityGrid,
}

impl AnalysisConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse analysis config")
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `kairos.toml` in the current directory
/// 2. `~/.config/kairos/config.toml`
///
/// Environment variable overrides: `KAIROS_TUTOR_COUNT`,
/// `KAIROS_TUTOR_MIN_ABILITY`, `KAIROS_TUTOR_MIN_PERCENT`.
pub fn load_config() -> Result<AnalysisConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AnalysisConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("kairos.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading analysis config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<AnalysisConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut AnalysisConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("KAIROS_TUTOR_COUNT") {
        config.tutors.count = v
            .trim()
            .parse()
            .with_context(|| format!("KAIROS_TUTOR_COUNT is not a count: {v}"))?;
    }
    if let Some(v) = lookup("KAIROS_TUTOR_MIN_ABILITY") {
        config.tutors.min_ability = v
            .trim()
            .parse()
            .with_context(|| format!("KAIROS_TUTOR_MIN_ABILITY is not a number: {v}"))?;
    }
    if let Some(v) = lookup("KAIROS_TUTOR_MIN_PERCENT") {
        config.tutors.min_percent = v
            .trim()
            .parse()
            .with_context(|| format!("KAIROS_TUTOR_MIN_PERCENT is not a number: {v}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("kairos"))
}
