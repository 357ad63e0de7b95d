//! Suite loading
//!
//! Reads the apps, models and tools JSON files plus a directory of test
//! case files into one immutable [`Suite`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mfcs_core::{AppConfig, ModelConfig, Suite, SuitePaths, TestCase, ToolConfig};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::SuiteConfig;

/// Restricts a run to some models or test cases
#[derive(Debug, Clone, Default)]
pub struct SuiteFilter {
    /// Model identifiers; empty means all
    pub models: Vec<String>,
    /// Test case file names, with or without the `.json` extension; empty means all
    pub cases: Vec<String>,
}

/// Load the suite described by `config`, applying `filter`
pub fn load_suite(config: &SuiteConfig, filter: &SuiteFilter) -> Result<Suite> {
    let apps: BTreeMap<String, AppConfig> = read_json(&config.apps)?;
    let (app_name, app) = select_app(apps, config.app.as_deref())?;

    let mut models: BTreeMap<String, ModelConfig> = read_json(&config.models)?;
    let tools: ToolConfig = read_json(&config.tools)?;
    let mut test_cases = load_test_cases(&config.test_cases)?;

    if !filter.models.is_empty() {
        for id in &filter.models {
            if !models.contains_key(id) {
                bail!(
                    "unknown model '{}' (available: {})",
                    id,
                    join_keys(models.keys())
                );
            }
        }
        models.retain(|id, _| filter.models.contains(id));
    }

    if !filter.cases.is_empty() {
        for name in &filter.cases {
            if !test_cases.iter().any(|case| case_matches(case, name)) {
                bail!("unknown test case '{}'", name);
            }
        }
        test_cases.retain(|case| filter.cases.iter().any(|name| case_matches(case, name)));
    }

    info!(
        app = %app_name,
        models = models.len(),
        tools = tools.0.len(),
        test_cases = test_cases.len(),
        "Loaded suite"
    );

    Ok(Suite {
        app_name,
        app,
        models,
        tools,
        test_cases,
        paths: SuitePaths {
            models: Some(config.models.clone()),
            tools: Some(config.tools.clone()),
            test_cases_dir: Some(config.test_cases.clone()),
        },
    })
}

fn select_app(
    mut apps: BTreeMap<String, AppConfig>,
    wanted: Option<&str>,
) -> Result<(String, AppConfig)> {
    match wanted {
        Some(name) => match apps.remove(name) {
            Some(app) => Ok((name.to_string(), app)),
            None => bail!(
                "application '{}' not found (available: {})",
                name,
                join_keys(apps.keys())
            ),
        },
        None if apps.len() == 1 => match apps.into_iter().next() {
            Some(entry) => Ok(entry),
            None => bail!("no applications configured"),
        },
        None if apps.is_empty() => bail!("no applications configured"),
        None => bail!(
            "several applications configured, choose one with --app (available: {})",
            join_keys(apps.keys())
        ),
    }
}

/// Load every `*.json` file in `dir`, sorted by file name
///
/// Each case's id is its file name.
pub fn load_test_cases(dir: &Path) -> Result<Vec<TestCase>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read test case directory {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let mut case: TestCase = read_json(&path)?;
        case.id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(test_case = %case.id, "Loaded test case");
        case.path = Some(path);
        cases.push(case);
    }
    Ok(cases)
}

fn case_matches(case: &TestCase, name: &str) -> bool {
    case.id == name || case.id.strip_suffix(".json") == Some(name)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfcs_core::ToolExpectation;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: SuiteConfig,
    }

    fn fixture(apps: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("config.json"), apps).unwrap();
        std::fs::write(
            root.join("models.json"),
            r#"{
                "qwen": {"name": "qwen-plus", "api_base": "https://example.invalid/v1", "api_key": "sk-1"},
                "deepseek": {"name": "deepseek-chat", "base_url": "https://example.invalid", "temperature": 0.2}
            }"#,
        )
        .unwrap();
        std::fs::write(
            root.join("tools.json"),
            r#"[{"name": "get_weather", "description": "Weather", "parameters": {"type": "object"}}]"#,
        )
        .unwrap();

        let cases = root.join("test_cases");
        std::fs::create_dir(&cases).unwrap();
        std::fs::write(
            cases.join("weather.json"),
            r#"{"input": {"user": "Weather in Tokyo?"}, "expected_output": {"contains_tool": "get_weather"}}"#,
        )
        .unwrap();
        std::fs::write(
            cases.join("chat.json"),
            r#"{"input": {"user": "Hello"}, "expected_output": {"semantic_match": "hello"}, "description": "small talk"}"#,
        )
        .unwrap();
        std::fs::write(cases.join("notes.txt"), "not a case").unwrap();

        let config = SuiteConfig {
            apps: root.join("config.json"),
            app: None,
            models: root.join("models.json"),
            tools: root.join("tools.json"),
            test_cases: cases,
        };
        Fixture { dir, config }
    }

    const ONE_APP: &str = r#"{"mfcs-python": {"command": "python", "args": ["app.py"], "stream": true}}"#;

    // ==================== Load Tests ====================

    #[test]
    fn loads_full_suite() {
        let f = fixture(ONE_APP);
        let suite = load_suite(&f.config, &SuiteFilter::default()).unwrap();

        assert_eq!(suite.app_name, "mfcs-python");
        assert!(suite.app.stream);
        assert_eq!(suite.models.keys().collect::<Vec<_>>(), ["deepseek", "qwen"]);
        assert_eq!(suite.models["deepseek"].api_base, "https://example.invalid");
        assert_eq!(suite.tools.tool_names().collect::<Vec<_>>(), ["get_weather"]);
        assert_eq!(suite.pair_count(), 4);
        assert_eq!(suite.paths.test_cases_dir, Some(f.dir.path().join("test_cases")));
    }

    #[test]
    fn test_cases_are_sorted_and_named_by_file() {
        let f = fixture(ONE_APP);
        let cases = load_test_cases(&f.config.test_cases).unwrap();

        let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["chat.json", "weather.json"]);
        assert_eq!(cases[0].description, "small talk");
        assert_eq!(
            cases[1].expected_output.contains_tool,
            ToolExpectation::RequireNamed("get_weather".to_string())
        );
        assert!(cases[1].path.as_ref().unwrap().ends_with("weather.json"));
    }

    #[test]
    fn invalid_test_case_names_the_file() {
        let f = fixture(ONE_APP);
        std::fs::write(f.config.test_cases.join("broken.json"), "{").unwrap();

        let err = load_test_cases(&f.config.test_cases).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let f = fixture(ONE_APP);
        assert!(load_test_cases(&f.dir.path().join("nope")).is_err());
    }

    // ==================== App Selection Tests ====================

    #[test]
    fn several_apps_require_a_choice() {
        let apps = r#"{"a": {"command": "a"}, "b": {"command": "b"}}"#;
        let mut f = fixture(apps);

        let err = load_suite(&f.config, &SuiteFilter::default()).unwrap_err();
        assert!(err.to_string().contains("--app"));

        f.config.app = Some("b".to_string());
        let suite = load_suite(&f.config, &SuiteFilter::default()).unwrap();
        assert_eq!(suite.app.command, "b");
    }

    #[test]
    fn unknown_app_lists_available() {
        let mut f = fixture(ONE_APP);
        f.config.app = Some("mfcs-go".to_string());

        let err = load_suite(&f.config, &SuiteFilter::default()).unwrap_err();
        assert!(err.to_string().contains("mfcs-python"));
    }

    // ==================== Filter Tests ====================

    #[test]
    fn filters_models_and_cases() {
        let f = fixture(ONE_APP);
        let filter = SuiteFilter {
            models: vec!["qwen".to_string()],
            cases: vec!["weather".to_string()],
        };

        let suite = load_suite(&f.config, &filter).unwrap();
        assert_eq!(suite.models.len(), 1);
        assert_eq!(suite.test_cases.len(), 1);
        assert_eq!(suite.test_cases[0].id, "weather.json");
    }

    #[test]
    fn unknown_model_filter_is_an_error() {
        let f = fixture(ONE_APP);
        let filter = SuiteFilter {
            models: vec!["gpt-9".to_string()],
            ..Default::default()
        };

        let err = load_suite(&f.config, &filter).unwrap_err();
        assert!(err.to_string().contains("gpt-9"));
    }
}
