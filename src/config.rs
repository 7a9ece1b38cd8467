//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - planner.toml (default configuration)
//! - planner.local.toml (git-ignored local overrides)
//! - Environment variables (POLICY_PLANNER_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # planner.toml
//! [dispatch]
//! enable_call_dynamic = true
//! min_dynamic_operands = 2
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! POLICY_PLANNER_DISPATCH__ENABLE_CALL_DYNAMIC=false
//! POLICY_PLANNER_LOGGING__LEVEL=debug
//! ```
//!
//! No field here changes planner *semantics* in a way that would violate
//! determinism for a fixed config (SPEC_FULL.md §D): these are ambient
//! tuning and logging knobs, not inputs to the IR shape.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning knobs for the §4.4 dispatch optimization. These adjust *when* the
/// planner prefers `CallDynamic` over the Block/Scan expansion when both are
/// legal; they never make an illegal dispatch legal or vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Master switch; when false the planner always falls back to the
    /// Block/Scan expansion.
    #[serde(default = "default_true")]
    pub enable_call_dynamic: bool,

    /// Minimum number of non-ground operands in a reference before the
    /// dispatch optimization is preferred over expansion.
    #[serde(default = "default_min_dynamic_operands")]
    pub min_dynamic_operands: usize,
}

fn default_min_dynamic_operands() -> usize {
    2
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            enable_call_dynamic: true,
            min_dynamic_operands: default_min_dynamic_operands(),
        }
    }
}

/// Logging configuration for the ambient `tracing` layer (SPEC_FULL.md §B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. planner.toml (base configuration)
    /// 2. planner.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (POLICY_PLANNER_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(PlannerConfig::default()))
            .merge(Toml::file("planner.toml"))
            .merge(Toml::file("planner.local.toml"))
            .merge(Env::prefixed("POLICY_PLANNER_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(PlannerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("POLICY_PLANNER_").split("__"))
            .extract()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
