mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    RawMfcsConfig, RawReportConfig, RawRunConfig, RawSuiteConfig, SemanticKind, SuiteConfig,
};
