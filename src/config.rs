use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::{Database, DEFAULT_DEDUP_WINDOW_HOURS};
use crate::scorer::{CompatibilityScorer, ScoringWeights, WeightPreset};
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Overrides `<data dir>/jobmatch.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// 0 turns duplicate detection off.
    #[serde(default = "default_dedup_window_hours")]
    pub dedup_window_hours: u32,
}

fn default_dedup_window_hours() -> u32 {
    DEFAULT_DEDUP_WINDOW_HOURS as u32
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            dedup_window_hours: default_dedup_window_hours(),
        }
    }
}

/// `weights = "skills-first"` or `weights = { skill = 0.7, experience = 0.2, education = 0.1 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightsConfig {
    Preset(WeightPreset),
    Custom(ScoringWeights),
}

impl Default for WeightsConfig {
    fn default() -> Self {
        WeightsConfig::Preset(WeightPreset::Balanced)
    }
}

impl WeightsConfig {
    pub fn resolve(self) -> ScoringWeights {
        match self {
            WeightsConfig::Preset(preset) => preset.weights(),
            WeightsConfig::Custom(weights) => weights,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub weights: WeightsConfig,

    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: usize,

    /// Skill terms recognized in addition to the built-in vocabulary.
    #[serde(default)]
    pub extra_skills: Vec<String>,
}

fn default_recommendation_limit() -> usize {
    5
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            recommendation_limit: default_recommendation_limit(),
            extra_skills: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `path` is None. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Config::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.matching.weights.resolve().normalized()?;
        if self.matching.recommendation_limit == 0 {
            bail!("matching.recommendation_limit must be at least 1");
        }
        if self.generator.max_tokens == 0 {
            bail!("generator.max_tokens must be at least 1");
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "jobmatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("jobmatch.toml"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.store.database_path.clone().unwrap_or_else(Database::default_path)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.store.dedup_window_hours))
    }

    pub fn open_database(&self) -> crate::Result<Database> {
        Ok(Database::open_at(&self.database_path())?.with_dedup_window(self.dedup_window()))
    }

    pub fn scorer(&self) -> crate::Result<CompatibilityScorer> {
        let vocabulary = Vocabulary::with_extra(&self.matching.extra_skills)?;
        CompatibilityScorer::new(
            vocabulary,
            self.matching.weights.resolve(),
            self.matching.recommendation_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store.dedup_window_hours, 720);
        assert_eq!(config.matching.recommendation_limit, 5);
        assert_eq!(config.generator.model, "llama-3.1-8b-instant");
        assert_eq!(config.matching.weights.resolve(), WeightPreset::Balanced.weights());
    }

    #[test]
    fn test_weight_preset_by_name() {
        let config: Config = toml::from_str("[matching]\nweights = \"skills-first\"\n").unwrap();
        assert_eq!(config.matching.weights, WeightsConfig::Preset(WeightPreset::SkillsFirst));
    }

    #[test]
    fn test_custom_weights_table() {
        let config: Config = toml::from_str(
            "[matching]\nweights = { skill = 2.0, experience = 1.0, education = 1.0 }\nextra_skills = [\"elixir\"]\n",
        )
        .unwrap();
        let scorer = config.scorer().unwrap();
        assert_eq!(scorer.weights().skill, 0.5);
        assert_eq!(scorer.weights().education, 0.25);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        assert!(toml::from_str::<Config>("[matching]\nweights = \"random\"\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.matching.weights = WeightsConfig::Custom(ScoringWeights {
            skill: 0.0,
            experience: 0.0,
            education: 0.0,
        });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.matching.recommendation_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[store]\ndatabase_path = \"/tmp/jobs.db\"\ndedup_window_hours = 0\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/jobs.db"));
        assert_eq!(config.dedup_window(), chrono::Duration::zero());

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
