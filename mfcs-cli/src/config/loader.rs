use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use mfcs_models::EmbeddingConfig;
use tracing::debug;

use super::types::{
    MfcsConfig, RawMfcsConfig, RawReportConfig, RawRunConfig, RawSuiteConfig, ReportConfig,
    RunConfig, SuiteConfig,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<MfcsConfig> {
        Self::load_with(RawMfcsConfig::default())
    }

    /// Load merged configuration with command-line values layered on top
    pub fn load_with(overrides: RawMfcsConfig) -> Result<MfcsConfig> {
        let mut raw = RawMfcsConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && let Some(user_config) = Self::read_layer(&user_path)?
        {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_layer(&Self::project_config_path())? {
            raw = Self::merge_raw(raw, project_config);
        }

        // Layer 3: Command line
        raw = Self::merge_raw(raw, overrides);

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mfcs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with MFCS_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("MFCS_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".mfcs/config.toml")
        }
    }

    /// Read one config file; a missing file is an empty layer
    fn read_layer(path: &Path) -> Result<Option<RawMfcsConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let layer = toml::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config layer");
        Ok(Some(layer))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawMfcsConfig, overlay: RawMfcsConfig) -> RawMfcsConfig {
        RawMfcsConfig {
            suite: RawSuiteConfig {
                apps: overlay.suite.apps.or(base.suite.apps),
                app: overlay.suite.app.or(base.suite.app),
                models: overlay.suite.models.or(base.suite.models),
                tools: overlay.suite.tools.or(base.suite.tools),
                test_cases: overlay.suite.test_cases.or(base.suite.test_cases),
            },
            run: RawRunConfig {
                concurrency: overlay.run.concurrency.or(base.run.concurrency),
                timeout_secs: overlay.run.timeout_secs.or(base.run.timeout_secs),
                semantic: overlay.run.semantic.or(base.run.semantic),
                threshold: overlay.run.threshold.or(base.run.threshold),
            },
            report: RawReportConfig {
                dir: overlay.report.dir.or(base.report.dir),
            },
            embedding: EmbeddingConfig {
                provider: overlay.embedding.provider.or(base.embedding.provider),
                model: overlay.embedding.model.or(base.embedding.model),
                base_url: overlay.embedding.base_url.or(base.embedding.base_url),
                api_key: overlay.embedding.api_key.or(base.embedding.api_key),
                api_key_env: overlay.embedding.api_key_env.or(base.embedding.api_key_env),
                timeout_secs: overlay.embedding.timeout_secs.or(base.embedding.timeout_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawMfcsConfig) -> MfcsConfig {
        let suite = SuiteConfig::default();
        let run = RunConfig::default();
        let report = ReportConfig::default();

        MfcsConfig {
            suite: SuiteConfig {
                apps: raw.suite.apps.unwrap_or(suite.apps),
                app: raw.suite.app,
                models: raw.suite.models.unwrap_or(suite.models),
                tools: raw.suite.tools.unwrap_or(suite.tools),
                test_cases: raw.suite.test_cases.unwrap_or(suite.test_cases),
            },
            run: RunConfig {
                concurrency: raw.run.concurrency.unwrap_or(run.concurrency),
                timeout_secs: raw.run.timeout_secs.unwrap_or(run.timeout_secs),
                semantic: raw.run.semantic.unwrap_or(run.semantic),
                threshold: raw.run.threshold,
            },
            report: ReportConfig {
                dir: raw.report.dir.unwrap_or(report.dir),
            },
            embedding: raw.embedding,
        }
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<MfcsConfig> {
        let raw = Self::read_layer(path)?.unwrap_or_default();
        Ok(Self::finalize(raw))
    }
}
