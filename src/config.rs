use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::intake::normalize_lexically;
use crate::snapshot::SnapshotPaths;
use crate::taxonomy::CollisionPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Intake area scanned by `ingest`.
    pub inbox: PathBuf,
    /// Where ingested sources are moved.
    pub processed: PathBuf,
    /// Directory holding the stage snapshots.
    pub structured: PathBuf,
}

impl PathsConfig {
    pub fn snapshots(&self) -> SnapshotPaths {
        SnapshotPaths::new(&self.structured)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntakeConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides the provider's default endpoint (useful for proxies and tests).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on in-flight extraction calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
        }
    }
}

impl ClassifierConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaxonomyConfig {
    #[serde(default = "default_target_min")]
    pub target_min: usize,
    #[serde(default = "default_target_max")]
    pub target_max: usize,
    /// Fail `normalize` instead of warning when the mapping omits a label.
    #[serde(default)]
    pub strict_coverage: bool,
    #[serde(default)]
    pub on_collision: CollisionPolicy,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            target_min: default_target_min(),
            target_max: default_target_max(),
            strict_coverage: false,
            on_collision: CollisionPolicy::default(),
        }
    }
}

fn default_target_min() -> usize {
    8
}
fn default_target_max() -> usize {
    15
}

impl Config {
    /// Config rooted at `root` with `notes/inbox`, `notes/processed` and
    /// `notes/structured` underneath, every other section defaulted.
    pub fn rooted_at(root: &Path) -> Self {
        let notes = root.join("notes");
        Self {
            paths: PathsConfig {
                inbox: notes.join("inbox"),
                processed: notes.join("processed"),
                structured: notes.join("structured"),
            },
            intake: IntakeConfig::default(),
            classifier: ClassifierConfig::default(),
            taxonomy: TaxonomyConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.intake.include_globs.is_empty() {
        anyhow::bail!("intake.include_globs must not be empty");
    }

    // Validate paths
    let inbox = normalize_lexically(&config.paths.inbox);
    for (key, path) in [
        ("paths.processed", &config.paths.processed),
        ("paths.structured", &config.paths.structured),
    ] {
        if normalize_lexically(path).starts_with(&inbox) {
            anyhow::bail!(
                "{} ({}) must not be inside paths.inbox ({})",
                key,
                path.display(),
                config.paths.inbox.display()
            );
        }
    }

    // Validate classifier
    match config.classifier.provider.as_str() {
        "disabled" | "gemini" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown classifier provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            other
        ),
    }
    if config.classifier.is_enabled() && config.classifier.model.is_none() {
        anyhow::bail!(
            "classifier.model must be specified when provider is '{}'",
            config.classifier.provider
        );
    }
    if config.classifier.concurrency == 0 {
        anyhow::bail!("classifier.concurrency must be >= 1");
    }

    // Validate taxonomy
    if config.taxonomy.target_min == 0 {
        anyhow::bail!("taxonomy.target_min must be >= 1");
    }
    if config.taxonomy.target_max < config.taxonomy.target_min {
        anyhow::bail!(
            "taxonomy.target_max ({}) must be >= taxonomy.target_min ({})",
            config.taxonomy.target_max,
            config.taxonomy.target_min
        );
    }

    Ok(())
}
