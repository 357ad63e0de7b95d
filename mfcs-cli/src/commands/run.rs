//! `mfcs run`: evaluate every pair and write a report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use mfcs_core::{Orchestrator, SemanticMode, SubprocessDriver};
use mfcs_models::embedder_from_config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::SuiteArgs;
use crate::config::{ConfigLoader, RawMfcsConfig, RawReportConfig, RawRunConfig, SemanticKind};
use crate::report::{self, Report};
use crate::suite;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,

    /// Maximum pairs evaluated at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-pair deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Semantic scorer
    #[arg(long, value_enum)]
    pub semantic: Option<SemanticKind>,

    /// Semantic match threshold (defaults to 0.5 for jaccard, 0.45 for embedding)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Directory reports are written to
    #[arg(long, value_name = "DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Also print one row per pair
    #[arg(long)]
    pub details: bool,
}

impl RunArgs {
    fn overrides(&self) -> RawMfcsConfig {
        RawMfcsConfig {
            run: RawRunConfig {
                concurrency: self.concurrency,
                timeout_secs: self.timeout,
                semantic: self.semantic,
                threshold: self.threshold,
            },
            report: RawReportConfig {
                dir: self.reports_dir.clone(),
            },
            ..self.suite.overrides()
        }
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.overrides())?;
    let suite = suite::load_suite(&config.suite, &args.suite.filter())?;
    let options = config.run.run_options();

    let embedder = match options.semantic {
        SemanticMode::Embedding { .. } => Some(embedder_from_config(&config.embedding)?),
        SemanticMode::Jaccard { .. } => None,
    };
    let orchestrator = Orchestrator::new(Arc::new(SubprocessDriver::new()), options, embedder)?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling outstanding pairs");
                cancel.cancel();
            }
        }
    });

    let app_name = suite.app_name.clone();
    let started_at = Utc::now();
    let records = orchestrator.run(Arc::new(suite), cancel.clone()).await;
    interrupt.abort();

    let report = Report::new(app_name, options, started_at, records, cancel.is_cancelled());
    let path = report.write(&config.report.dir)?;

    if args.details {
        println!("{}", report::records_table(&report.records));
    }
    println!("{}", report::summary_table(&report));
    info!(path = %path.display(), run_id = %report.run_id, "Report written");
    println!("Report: {}", path.display());

    if report.interrupted {
        bail!("run interrupted; partial report written to {}", path.display());
    }
    Ok(())
}
