pub mod check;
pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::Args;

use crate::config::{RawMfcsConfig, RawSuiteConfig};
use crate::suite::SuiteFilter;

/// Suite selection shared by `run` and `check`
#[derive(Args, Debug, Default)]
pub struct SuiteArgs {
    /// Apps file, keyed by application name
    #[arg(long, value_name = "FILE")]
    pub apps: Option<PathBuf>,

    /// Application to run from the apps file
    #[arg(long)]
    pub app: Option<String>,

    /// Models file, keyed by model identifier
    #[arg(long, value_name = "FILE")]
    pub models: Option<PathBuf>,

    /// Tool definitions file
    #[arg(long, value_name = "FILE")]
    pub tools: Option<PathBuf>,

    /// Directory of test case JSON files
    #[arg(long, value_name = "DIR")]
    pub test_cases: Option<PathBuf>,

    /// Only evaluate this model (repeatable)
    #[arg(long = "model", value_name = "ID")]
    pub model_filter: Vec<String>,

    /// Only evaluate this test case (repeatable)
    #[arg(long = "case", value_name = "NAME")]
    pub case_filter: Vec<String>,
}

impl SuiteArgs {
    /// Command-line values as the topmost config layer
    pub fn overrides(&self) -> RawMfcsConfig {
        RawMfcsConfig {
            suite: RawSuiteConfig {
                apps: self.apps.clone(),
                app: self.app.clone(),
                models: self.models.clone(),
                tools: self.tools.clone(),
                test_cases: self.test_cases.clone(),
            },
            ..Default::default()
        }
    }

    pub fn filter(&self) -> SuiteFilter {
        SuiteFilter {
            models: self.model_filter.clone(),
            cases: self.case_filter.clone(),
        }
    }
}
