use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::validation::ValidationError;

/// Application-level constants
pub const APP_NAME: &str = "DocFlow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "DOCFLOW_CONFIG";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "docflow_lib=info,warn"
}

/// Get the application data directory (~/DocFlow/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the validator database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("docflow.db")
}

/// Config file location: `$DOCFLOW_CONFIG` or `~/DocFlow/config.json`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("config.json"))
}

/// A single code pattern of a contract-specific extraction profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    pub name: String,
    pub pattern: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i32,
}

/// Tunables for the matching and resolution engine.
///
/// The auto-resolve threshold is intentionally absent: every bulk
/// resolution call states its own threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Number of candidates returned by the ranker when the caller gives no limit.
    pub candidate_limit: usize,
    /// Candidates scoring below this are dropped from rankings.
    pub min_candidate_similarity: f64,
    /// Batch size used by auto-grouping when the caller gives none.
    pub max_per_batch: usize,
    /// Prefix of generated GRDT numbers.
    pub grdt_prefix: String,
    /// Extraction profiles keyed by name (e.g. "RIR", "PID").
    pub extraction_profiles: HashMap<String, Vec<PatternConfig>>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 10,
            min_candidate_similarity: 0.0,
            max_per_batch: 50,
            grdt_prefix: "eGRDT".to_string(),
            extraction_profiles: HashMap::new(),
        }
    }
}

impl ValidatorConfig {
    /// Load config from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ValidationError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ValidationError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `config_path()`.
    pub fn load_default() -> Result<Self, ValidationError> {
        Self::load(&config_path())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_per_batch == 0 {
            return Err(ValidationError::Config("max_per_batch must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.min_candidate_similarity) {
            return Err(ValidationError::Config(format!(
                "min_candidate_similarity must be within [0, 1], got {}",
                self.min_candidate_similarity
            )));
        }
        // Compiling surfaces bad regexes at load time rather than at first use.
        for name in self.extraction_profiles.keys() {
            self.extraction_profile(name)?;
        }
        Ok(())
    }

    /// Build the named extraction profile, if configured.
    pub fn extraction_profile(
        &self,
        name: &str,
    ) -> Result<Option<crate::pipeline::validation::ExtractionProfile>, ValidationError> {
        match self.extraction_profiles.get(name) {
            Some(patterns) => Ok(Some(
                crate::pipeline::validation::ExtractionProfile::from_config(name, patterns)?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("DocFlow"));
    }

    #[test]
    fn database_path_under_app_data() {
        assert!(database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ValidatorConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ValidatorConfig::default());
        assert_eq!(config.max_per_batch, 50);
        assert_eq!(config.grdt_prefix, "eGRDT");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_per_batch": 20}"#).unwrap();

        let config = ValidatorConfig::load(&path).unwrap();
        assert_eq!(config.max_per_batch, 20);
        assert_eq!(config.candidate_limit, 10);
    }

    #[test]
    fn profiles_are_compiled_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"extraction_profiles": {"RIR": [{"name": "rir", "pattern": "\\b(RIR-\\d{4})\\b", "priority": 0}]}}"#,
        )
        .unwrap();

        let config = ValidatorConfig::load(&path).unwrap();
        let profile = config.extraction_profile("RIR").unwrap().unwrap();
        assert_eq!(profile.name(), "RIR");
        assert!(config.extraction_profile("PID").unwrap().is_none());
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"extraction_profiles": {"BAD": [{"name": "bad", "pattern": "(unclosed"}]}}"#,
        )
        .unwrap();

        let err = ValidatorConfig::load(&path).unwrap_err();
        assert!(matches!(err, ValidationError::Config(_)));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_per_batch": 0}"#).unwrap();
        assert!(ValidatorConfig::load(&path).is_err());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
