//! `mfcs check`: load everything and show the pair matrix without
//! launching any driver.

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mfcs_core::{MetricsEngine, SemanticMode, Suite, TestCase, ToolExpectation};
use mfcs_models::embedder_from_config;

use super::SuiteArgs;
use crate::config::ConfigLoader;
use crate::suite;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.suite.overrides())?;
    let suite = suite::load_suite(&config.suite, &args.suite.filter())?;
    let mode = config.run.semantic_mode();

    // Builds the embedder without calling it, so bad credentials show up here
    let embedder = match mode {
        SemanticMode::Embedding { .. } => Some(embedder_from_config(&config.embedding)?),
        SemanticMode::Jaccard { .. } => None,
    };
    let engine = MetricsEngine::for_mode(mode, embedder)?;

    println!(
        "App: {} ({}{})",
        suite.app_name,
        suite.app.command,
        if suite.app.stream { ", streaming" } else { "" }
    );
    println!(
        "Scorer: {} (threshold {:.2})",
        engine.scorer_name(),
        mode.threshold()
    );
    println!();
    println!("{}", cases_table(&suite));
    println!("{}", pair_matrix(&suite));
    println!(
        "{} models x {} test cases = {} pairs",
        suite.models.len(),
        suite.test_cases.len(),
        suite.pair_count()
    );
    Ok(())
}

fn describe_tool(expectation: &ToolExpectation) -> String {
    match expectation {
        ToolExpectation::Absent => "-".to_string(),
        ToolExpectation::RequireAny => "any".to_string(),
        ToolExpectation::Forbidden => "none".to_string(),
        ToolExpectation::RequireNamed(name) => name.clone(),
    }
}

fn cases_table(suite: &Suite) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Test Case").fg(Color::Cyan),
        Cell::new("Query").fg(Color::Cyan),
        Cell::new("Tool").fg(Color::Cyan),
        Cell::new("Semantic Match").fg(Color::Cyan),
    ]);

    for case in &suite.test_cases {
        table.add_row(vec![
            Cell::new(&case.id),
            Cell::new(&case.input.user),
            Cell::new(describe_tool(&case.expected_output.contains_tool)),
            Cell::new(case.expected_output.semantic_target().unwrap_or("-")),
        ]);
    }
    table
}

/// Models down, test cases across; a cell is marked when the tool a case
/// expects is missing from the tool file.
fn pair_matrix(suite: &Suite) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Model").fg(Color::Cyan)];
    header.extend(
        suite
            .test_cases
            .iter()
            .map(|case| Cell::new(&case.id).fg(Color::Cyan)),
    );
    table.set_header(header);

    for (model_id, model) in &suite.models {
        let label = if model.name.is_empty() || model.name == *model_id {
            model_id.clone()
        } else {
            format!("{} ({})", model_id, model.name)
        };
        let mut row = vec![Cell::new(label)];
        row.extend(
            suite
                .test_cases
                .iter()
                .map(|case| pair_cell(suite, case)),
        );
        table.add_row(row);
    }
    table
}

fn pair_cell(suite: &Suite, case: &TestCase) -> Cell {
    match &case.expected_output.contains_tool {
        ToolExpectation::RequireNamed(name) if suite.tools.index_of(name).is_none() => {
            Cell::new(format!("unknown tool {name}")).fg(Color::Yellow)
        }
        _ => Cell::new("ok").fg(Color::Green),
    }
}
