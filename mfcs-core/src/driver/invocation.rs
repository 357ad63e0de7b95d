//! Construction of a single driver launch

use std::collections::BTreeMap;
use std::path::Path;

use crate::types::{ApiKey, ModelConfig, Suite, TestCase, ToolExpectation};

/// Environment variable carrying the model's API base URL
pub const ENV_API_BASE: &str = "MFCS_API_BASE";
/// Environment variable carrying the model's API key
pub const ENV_API_KEY: &str = "MFCS_API_KEY";
/// Environment variable carrying the model identifier
pub const ENV_MODEL: &str = "MFCS_MODEL";

/// Everything needed to launch the driver for one (model, test case) pair
#[derive(Debug, Clone)]
pub struct Invocation {
    pub model_id: String,
    pub test_case_id: String,
    pub program: String,
    /// Arguments with placeholders already expanded
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Passed through the environment only, never in argv
    pub api_key: Option<ApiKey>,
    pub stream: bool,
    pub query: String,
}

impl Invocation {
    /// Build the invocation for one pair from the suite's app template
    pub fn new(suite: &Suite, model_id: &str, model: &ModelConfig, case: &TestCase) -> Self {
        let vars = template_vars(suite, model_id, model, case);

        let args = suite
            .app
            .args
            .iter()
            .map(|arg| expand_template(arg, &vars))
            .collect();

        let mut env: BTreeMap<String, String> = suite
            .app
            .env
            .iter()
            .map(|(key, value)| (key.clone(), expand_template(value, &vars)))
            .collect();
        env.insert(ENV_MODEL.to_string(), model_id.to_string());
        if !model.api_base.is_empty() {
            env.insert(ENV_API_BASE.to_string(), model.api_base.clone());
        }

        Self {
            model_id: model_id.to_string(),
            test_case_id: case.id.clone(),
            program: suite.app.command.clone(),
            args,
            env,
            api_key: model.api_key.clone(),
            stream: suite.app.stream,
            query: case.input.user.clone(),
        }
    }
}

fn template_vars(
    suite: &Suite,
    model_id: &str,
    model: &ModelConfig,
    case: &TestCase,
) -> BTreeMap<&'static str, String> {
    let model_name = if model.name.is_empty() {
        model_id
    } else {
        model.name.as_str()
    };

    // -1 tells drivers to offer every tool
    let tools_index = match &case.expected_output.contains_tool {
        ToolExpectation::RequireNamed(name) => suite
            .tools
            .index_of(name)
            .map_or(-1, |index| index as i64),
        _ => -1,
    };

    let path = |path: Option<&Path>| path.map(|p| p.display().to_string()).unwrap_or_default();

    BTreeMap::from([
        ("model_id", model_id.to_string()),
        ("model_name", model_name.to_string()),
        ("query", case.input.user.clone()),
        ("test_case_id", case.id.clone()),
        ("test_case_path", path(case.path.as_deref())),
        ("test_cases_dir", path(suite.paths.test_cases_dir.as_deref())),
        ("models_path", path(suite.paths.models.as_deref())),
        ("tools_path", path(suite.paths.tools.as_deref())),
        ("tools_index", tools_index.to_string()),
    ])
}

/// Replace `{name}` placeholders in one pass
///
/// Unknown placeholders are kept verbatim and substituted values are never
/// re-expanded.
pub fn expand_template(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        match vars.get(&after[..close]) {
            Some(value) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::{AppConfig, ExpectedOutput, SuitePaths, ToolConfig, ToolDefinition};

    fn suite(args: &[&str]) -> Suite {
        let mut env = BTreeMap::new();
        env.insert("CASE".to_string(), "{test_case_id}".to_string());
        Suite {
            app_name: "mfcs-python".to_string(),
            app: AppConfig {
                command: "python".to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                stream: true,
                env,
            },
            models: BTreeMap::new(),
            tools: ToolConfig(vec![
                ToolDefinition {
                    name: "search".to_string(),
                    description: String::new(),
                    parameters: serde_json::Value::Null,
                },
                ToolDefinition {
                    name: "get_weather".to_string(),
                    description: String::new(),
                    parameters: serde_json::Value::Null,
                },
            ]),
            test_cases: Vec::new(),
            paths: SuitePaths {
                models: Some(PathBuf::from("config/models.json")),
                tools: Some(PathBuf::from("config/tools.json")),
                test_cases_dir: Some(PathBuf::from("test_cases")),
            },
        }
    }

    fn case() -> TestCase {
        let mut case = TestCase::new("weather.json", "Weather in Tokyo?").with_expected(
            ExpectedOutput {
                semantic_match: None,
                contains_tool: ToolExpectation::RequireNamed("get_weather".to_string()),
            },
        );
        case.path = Some(PathBuf::from("test_cases/weather.json"));
        case
    }

    // ==================== expand_template Tests ====================

    #[test]
    fn expand_replaces_known_placeholders() {
        let vars = BTreeMap::from([("model_id", "gpt".to_string())]);
        assert_eq!(expand_template("--model_name={model_id}", &vars), "--model_name=gpt");
    }

    #[test]
    fn expand_keeps_unknown_placeholders() {
        let vars = BTreeMap::from([("model_id", "gpt".to_string())]);
        assert_eq!(expand_template("{other} {model_id}", &vars), "{other} gpt");
    }

    #[test]
    fn expand_does_not_reexpand_values() {
        let vars = BTreeMap::from([
            ("query", "say {model_id}".to_string()),
            ("model_id", "gpt".to_string()),
        ]);
        assert_eq!(expand_template("{query}", &vars), "say {model_id}");
    }

    #[test]
    fn expand_handles_unclosed_brace() {
        let vars = BTreeMap::from([("model_id", "gpt".to_string())]);
        assert_eq!(expand_template("{model_id} {oops", &vars), "gpt {oops");
    }

    #[test]
    fn expand_json_braces_pass_through() {
        let vars = BTreeMap::new();
        assert_eq!(expand_template(r#"{"a": 1}"#, &vars), r#"{"a": 1}"#);
    }

    // ==================== Invocation Tests ====================

    #[test]
    fn invocation_expands_driver_arguments() {
        let suite = suite(&[
            "apps/mfcs-python/mfcs-python.py",
            "--model",
            "{models_path}",
            "--model_name",
            "{model_id}",
            "--tools",
            "{tools_path}",
            "--tools_index",
            "{tools_index}",
            "--test_cases",
            "{test_cases_dir}",
            "--test_case_name",
            "{test_case_id}",
        ]);
        let model = ModelConfig::new("GPT-4o", "https://api.example.com/v1");
        let invocation = Invocation::new(&suite, "gpt-4o", &model, &case());

        assert_eq!(invocation.program, "python");
        assert_eq!(
            invocation.args,
            vec![
                "apps/mfcs-python/mfcs-python.py",
                "--model",
                "config/models.json",
                "--model_name",
                "gpt-4o",
                "--tools",
                "config/tools.json",
                "--tools_index",
                "1",
                "--test_cases",
                "test_cases",
                "--test_case_name",
                "weather.json",
            ]
        );
        assert!(invocation.stream);
        assert_eq!(invocation.query, "Weather in Tokyo?");
    }

    #[test]
    fn invocation_passes_model_through_env() {
        let suite = suite(&[]);
        let mut model = ModelConfig::new("GPT", "https://api.example.com/v1");
        model.api_key = Some(ApiKey::new("sk-secret"));
        let invocation = Invocation::new(&suite, "gpt", &model, &case());

        assert_eq!(invocation.env[ENV_MODEL], "gpt");
        assert_eq!(invocation.env[ENV_API_BASE], "https://api.example.com/v1");
        assert_eq!(invocation.env["CASE"], "weather.json");
        assert!(!invocation.env.contains_key(ENV_API_KEY));
        assert_eq!(invocation.api_key.unwrap().expose_secret(), "sk-secret");
    }

    #[test]
    fn tools_index_defaults_to_all_tools() {
        let suite = suite(&["{tools_index}", "{model_name}", "{test_case_path}"]);
        let model = ModelConfig::new("", "");
        let plain = TestCase::new("hello.json", "Hi");
        let invocation = Invocation::new(&suite, "local", &model, &plain);
        assert_eq!(invocation.args, vec!["-1", "local", ""]);
        assert!(!invocation.env.contains_key(ENV_API_BASE));
    }
}
