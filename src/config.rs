use crate::embedding::MINILM_MODEL_ID;
use crate::resolve::{DEFAULT_REASONING_MARKER, ResolverSettings};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

pub const CONFIG_FILE_ENV: &str = "CATMAP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0}")]
    Invalid(String),
}

/// Run configuration. Built once and passed down explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub oracle_url: String,
    pub top_n: usize,
    pub max_concurrent: usize,
    pub similarity_threshold: f32,
    pub checkpoint_interval: usize,
    pub max_trailing_depth: usize,
    pub embedding_model: String,
    pub oracle_timeout_secs: u64,
    pub reasoning_marker: String,
    pub taxonomy_path: Option<PathBuf>,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
    pub audit_log_path: Option<PathBuf>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            oracle_url: "http://localhost:8000/generate".into(),
            top_n: 30,
            max_concurrent: 2,
            similarity_threshold: 0.85,
            checkpoint_interval: 10,
            max_trailing_depth: 3,
            embedding_model: MINILM_MODEL_ID.into(),
            oracle_timeout_secs: 120,
            reasoning_marker: DEFAULT_REASONING_MARKER.into(),
            taxonomy_path: None,
            input_path: None,
            output_path: None,
            checkpoint_path: None,
            audit_log_path: None,
        }
    }
}

/// Fully resolved file locations for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub taxonomy: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    pub audit_log: PathBuf,
}

impl MapperConfig {
    /// Defaults, then the YAML file named by `CATMAP_CONFIG`, then `CATMAP_*`
    /// environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CATMAP_ORACLE_URL") {
            self.oracle_url = v.trim().to_string();
        }
        if let Some(v) = get("CATMAP_EMBEDDING_MODEL") {
            self.embedding_model = v.trim().to_string();
        }
        if let Some(v) = lookup("CATMAP_REASONING_MARKER") {
            self.reasoning_marker = v;
        }
        override_parsed(&mut self.top_n, "CATMAP_TOP_N", get("CATMAP_TOP_N"))?;
        override_parsed(
            &mut self.max_concurrent,
            "CATMAP_MAX_CONCURRENT",
            get("CATMAP_MAX_CONCURRENT"),
        )?;
        override_parsed(
            &mut self.similarity_threshold,
            "CATMAP_SIMILARITY_THRESHOLD",
            get("CATMAP_SIMILARITY_THRESHOLD"),
        )?;
        override_parsed(
            &mut self.checkpoint_interval,
            "CATMAP_CHECKPOINT_INTERVAL",
            get("CATMAP_CHECKPOINT_INTERVAL"),
        )?;
        override_parsed(
            &mut self.max_trailing_depth,
            "CATMAP_MAX_TRAILING_DEPTH",
            get("CATMAP_MAX_TRAILING_DEPTH"),
        )?;
        override_parsed(
            &mut self.oracle_timeout_secs,
            "CATMAP_ORACLE_TIMEOUT_SECS",
            get("CATMAP_ORACLE_TIMEOUT_SECS"),
        )?;

        for (slot, key) in [
            (&mut self.taxonomy_path, "CATMAP_TAXONOMY"),
            (&mut self.input_path, "CATMAP_INPUT"),
            (&mut self.output_path, "CATMAP_OUTPUT"),
            (&mut self.checkpoint_path, "CATMAP_CHECKPOINT"),
            (&mut self.audit_log_path, "CATMAP_AUDIT_LOG"),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(PathBuf::from(v.trim()));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("top_n", self.top_n),
            ("max_concurrent", self.max_concurrent),
            ("checkpoint_interval", self.checkpoint_interval),
            ("max_trailing_depth", self.max_trailing_depth),
            ("oracle_timeout_secs", self.oracle_timeout_secs as usize),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.oracle_url.trim().is_empty() {
            return Err(ConfigError::Missing("oracle_url (CATMAP_ORACLE_URL)"));
        }
        self.paths().map(|_| ())
    }

    /// Output, checkpoint and audit paths default to siblings of the input.
    pub fn paths(&self) -> Result<RunPaths, ConfigError> {
        let taxonomy = self
            .taxonomy_path
            .clone()
            .ok_or(ConfigError::Missing("taxonomy_path (CATMAP_TAXONOMY)"))?;
        let input = self
            .input_path
            .clone()
            .ok_or(ConfigError::Missing("input_path (CATMAP_INPUT)"))?;

        let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "categories".into());

        Ok(RunPaths {
            output: self
                .output_path
                .clone()
                .unwrap_or_else(|| dir.join(format!("{stem}_mapped.csv"))),
            checkpoint: self
                .checkpoint_path
                .clone()
                .unwrap_or_else(|| dir.join(format!("{stem}_mapped_autosave.csv"))),
            audit_log: self
                .audit_log_path
                .clone()
                .unwrap_or_else(|| dir.join("category_mapping_logs.txt")),
            taxonomy,
            input,
        })
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            reasoning_marker: self.reasoning_marker.clone(),
            max_trailing_depth: self.max_trailing_depth,
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

fn override_parsed<T: FromStr>(
    slot: &mut T,
    key: &'static str,
    raw: Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = raw {
        *slot = value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}
