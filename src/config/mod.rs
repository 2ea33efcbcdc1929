//! Pipeline configuration.
//!
//! Every vendor-specific correction lives here rather than in code. A config
//! file only needs the keys it changes:
//!
//! ```toml
//! size_classes = ["S", "M", "L", "XL", "2XL", "3XL"]
//!
//! [normalization]
//! fallback_environment = "bare metal, dedicated server"
//!
//! [normalization.platform_aliases]
//! "graphscope" = "GraphScope Flash"
//!
//! [normalization.pricing_overrides]
//! "Alibaba Cloud ecs.r7.16xlarge" = 35000.0
//!
//! [penalty]
//! timeout_multiplier = 3.0
//! run_count = 3
//! ```

use crate::error::{LeaderboardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_FALLBACK_ENVIRONMENT: &str = "bare metal, dedicated server";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Size classes taking part in the leaderboard. Empty means every class in
    /// the size-ordering table.
    pub size_classes: Vec<String>,
    pub normalization: NormalizationConfig,
    pub penalty: PenaltyPolicy,
    pub display: DisplayConfig,
}

/// Name and price corrections applied while flattening submissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Label used when a submission reports an empty environment name
    pub fallback_environment: String,
    /// Raw platform name -> canonical platform name
    pub platform_aliases: BTreeMap<String, String>,
    /// Raw environment name -> canonical environment name
    pub environment_aliases: BTreeMap<String, String>,
    /// Canonical environment name -> price replacing the submitted one
    pub pricing_overrides: BTreeMap<String, f64>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            fallback_environment: DEFAULT_FALLBACK_ENVIRONMENT.to_string(),
            platform_aliases: BTreeMap::new(),
            environment_aliases: BTreeMap::new(),
            pricing_overrides: BTreeMap::new(),
        }
    }
}

impl NormalizationConfig {
    pub fn canonical_platform(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        self.platform_aliases
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn canonical_environment(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return self.fallback_environment.clone();
        }
        self.environment_aliases
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// Resolves the price of a canonical environment. An override wins over the
    /// submitted figure; a non-positive or non-finite price counts as unknown.
    pub fn resolve_pricing(&self, environment: &str, submitted: Option<f64>) -> Option<f64> {
        let pricing = match self.pricing_overrides.get(environment) {
            Some(&price) => {
                log::debug!("pricing override for '{}': {}", environment, price);
                Some(price)
            }
            None => submitted,
        };
        pricing.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// How missing or failed workload items are charged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PenaltyPolicy {
    /// Imputed time is this many timeouts
    pub timeout_multiplier: f64,
    /// Run count reported for an imputed item
    pub run_count: u32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            timeout_multiplier: 3.0,
            run_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Throughput per dollar is multiplied by this before it is reported
    pub throughput_scale: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            throughput_scale: 1_000_000.0,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration file; omitted keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LeaderboardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|source| LeaderboardError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn includes_size(&self, size_class: &str) -> bool {
        self.size_classes.is_empty() || self.size_classes.iter().any(|s| s == size_class)
    }
}
