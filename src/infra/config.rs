//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/rebuild.toml

use crate::domain::types::Direction;
use crate::infra::error::ReconstructError;
use anyhow::Context;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default fork budget per starting event
pub const DEFAULT_MAX_FORKS_PER_TASK: usize = 4096;

/// Core reconstruction settings, passed explicitly to every component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionConfig {
    pub entry_points: BTreeMap<Direction, BTreeSet<String>>,
    pub exit_points: BTreeMap<Direction, BTreeSet<String>>,
    /// Forks allowed per starting event before its open journeys are dropped
    pub max_forks_per_task: Option<usize>,
    /// Matching time allowed per starting event
    pub max_task_duration: Option<Duration>,
    /// Points where at most one continuation can exist
    pub no_segmentation_points: BTreeSet<String>,
    /// Reject candidates whose global ids disagree with the journey's
    pub strict_global_ids: bool,
    /// Worker threads (None uses the global rayon pool)
    pub threads: Option<usize>,
}

impl ReconstructionConfig {
    pub fn new() -> Self {
        Self { max_forks_per_task: Some(DEFAULT_MAX_FORKS_PER_TASK), ..Self::default() }
    }

    pub fn with_entry(mut self, direction: Direction, point: &str) -> Self {
        self.entry_points.entry(direction).or_default().insert(point.to_string());
        self
    }

    pub fn with_exit(mut self, direction: Direction, point: &str) -> Self {
        self.exit_points.entry(direction).or_default().insert(point.to_string());
        self
    }

    pub fn with_max_forks(mut self, max_forks: Option<usize>) -> Self {
        self.max_forks_per_task = max_forks;
        self
    }

    pub fn with_max_task_duration(mut self, duration: Option<Duration>) -> Self {
        self.max_task_duration = duration;
        self
    }

    pub fn with_no_segmentation(mut self, point: &str) -> Self {
        self.no_segmentation_points.insert(point.to_string());
        self
    }

    pub fn with_strict_global_ids(mut self, strict: bool) -> Self {
        self.strict_global_ids = strict;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn is_entry(&self, direction: Direction, point: &str) -> bool {
        self.entry_points.get(&direction).is_some_and(|s| s.contains(point))
    }

    pub fn is_exit(&self, direction: Direction, point: &str) -> bool {
        self.exit_points.get(&direction).is_some_and(|s| s.contains(point))
    }

    pub fn entries(&self, direction: Direction) -> impl Iterator<Item = &str> {
        self.entry_points.get(&direction).into_iter().flatten().map(String::as_str)
    }

    pub fn exits(&self, direction: Direction) -> impl Iterator<Item = &str> {
        self.exit_points.get(&direction).into_iter().flatten().map(String::as_str)
    }

    /// A direction is usable when it has both entry and exit points
    pub fn has_endpoints(&self, direction: Direction) -> bool {
        self.entries(direction).next().is_some() && self.exits(direction).next().is_some()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ReconstructError> {
        if !Direction::ALL.iter().any(|d| self.has_endpoints(*d)) {
            return Err(ReconstructError::NoEntryExitPoints);
        }
        let all_points = self
            .entry_points
            .values()
            .chain(self.exit_points.values())
            .flatten()
            .chain(self.no_segmentation_points.iter());
        for point in all_points {
            if point.is_empty() {
                return Err(ReconstructError::InvalidConfig("empty point name".to_string()));
            }
        }
        if self.max_forks_per_task == Some(0) {
            return Err(ReconstructError::InvalidConfig(
                "max_forks_per_task must be positive".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ReconstructError::InvalidConfig("threads must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DirectionPointsConfig {
    #[serde(default)]
    pub entry: Vec<String>,
    #[serde(default)]
    pub exit: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointsConfig {
    #[serde(default = "default_forward_points")]
    pub forward: DirectionPointsConfig,
    #[serde(default = "default_reverse_points")]
    pub reverse: DirectionPointsConfig,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self { forward: default_forward_points(), reverse: default_reverse_points() }
    }
}

fn default_forward_points() -> DirectionPointsConfig {
    DirectionPointsConfig {
        entry: vec!["ip.in".to_string()],
        exit: vec!["phy.out.proc".to_string()],
    }
}

fn default_reverse_points() -> DirectionPointsConfig {
    DirectionPointsConfig {
        entry: vec!["phy.start".to_string()],
        exit: vec![
            "gtp.out".to_string(),
            "pdcp.discarded.rcvdsmallerdeliv".to_string(),
            "pdcp.discarded.badpdusize".to_string(),
            "pdcp.discarded.integrityfailed".to_string(),
            "macdrop".to_string(),
        ],
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Fork budget per starting event (0 disables the limit)
    #[serde(default = "default_max_forks")]
    pub max_forks_per_task: usize,
    /// Matching time budget per starting event in ms (0 disables the limit)
    #[serde(default)]
    pub max_task_duration_ms: u64,
    #[serde(default)]
    pub no_segmentation_points: Vec<String>,
    #[serde(default)]
    pub strict_global_ids: bool,
}

fn default_max_forks() -> usize {
    DEFAULT_MAX_FORKS_PER_TASK
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_forks_per_task: default_max_forks(),
            max_task_duration_ms: 0,
            no_segmentation_points: Vec::new(),
            strict_global_ids: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Worker threads (0 uses all cores)
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for journey egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
    /// Also write journeys that did not complete
    #[serde(default)]
    pub include_unfinished: bool,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file(), include_unfinished: false }
    }
}

fn default_egress_file() -> String {
    "journeys.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub egress: EgressConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    reconstruction: ReconstructionConfig,
    config_file: String,
    egress_file: String,
    egress_include_unfinished: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let mut reconstruction = ReconstructionConfig::new();
        for (direction, points) in [
            (Direction::Forward, toml_config.points.forward),
            (Direction::Reverse, toml_config.points.reverse),
        ] {
            for entry in points.entry {
                reconstruction = reconstruction.with_entry(direction, &entry);
            }
            for exit in points.exit {
                reconstruction = reconstruction.with_exit(direction, &exit);
            }
        }

        let matching = toml_config.matching;
        reconstruction.max_forks_per_task =
            (matching.max_forks_per_task > 0).then_some(matching.max_forks_per_task);
        reconstruction.max_task_duration = (matching.max_task_duration_ms > 0)
            .then(|| Duration::from_millis(matching.max_task_duration_ms));
        reconstruction.no_segmentation_points =
            matching.no_segmentation_points.into_iter().collect();
        reconstruction.strict_global_ids = matching.strict_global_ids;
        reconstruction.threads =
            (toml_config.runtime.threads > 0).then_some(toml_config.runtime.threads);

        Self {
            reconstruction,
            config_file: config_file.to_string(),
            egress_file: toml_config.egress.file,
            egress_include_unfinished: toml_config.egress.include_unfinished,
        }
    }

    /// Determine config file path: command line, then `CONFIG_FILE`, then default
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/rebuild.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from the resolved path.
    ///
    /// An explicit command-line path must load; the environment or default
    /// path falls back to defaults when missing.
    pub fn load(cli_path: Option<&str>) -> anyhow::Result<Self> {
        match cli_path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::load_from_path(Self::resolve_config_path(None))),
        }
    }

    /// Load configuration from a path, falling back to defaults on failure
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn reconstruction(&self) -> &ReconstructionConfig {
        &self.reconstruction
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn egress_include_unfinished(&self) -> bool {
        self.egress_include_unfinished
    }

    /// Builder method to override the egress file (e.g. from the command line)
    pub fn with_egress_file(mut self, file: &str) -> Self {
        self.egress_file = file.to_string();
        self
    }

    /// Builder method to override the worker thread count
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.reconstruction.threads = threads;
        self
    }
}
