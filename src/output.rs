use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::lifecycle::{LifecycleReport, Step, StepOutcome, StepStatus};
use crate::suite::SuiteReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Tree,
    Json,
}

#[derive(Tabled)]
struct CaseRow {
    case: String,
    dir: String,
    result: &'static str,
    #[tabled(rename = "failed step")]
    failed_step: String,
    resources: String,
    #[tabled(rename = "time (s)")]
    seconds: String,
}

impl CaseRow {
    fn from_report(report: &LifecycleReport) -> Self {
        let failed_step = match (report.failure(), report.teardown_failure()) {
            (Some((step, _)), _) => step.to_string(),
            (None, Some(_)) => "destroy".to_string(),
            (None, None) => "-".to_string(),
        };
        let resources = report
            .steps
            .iter()
            .find_map(|outcome| outcome.resources.filter(|_| outcome.step == Step::Apply))
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        let total: f64 = report
            .steps
            .iter()
            .map(|outcome| outcome.duration.as_secs_f64())
            .sum();

        Self {
            case: report.name.clone(),
            dir: report.dir.display().to_string(),
            result: if report.passed() { "PASS" } else { "FAIL" },
            failed_step,
            resources,
            seconds: format!("{total:.1}"),
        }
    }
}

pub fn render(report: &SuiteReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Table => Ok(render_table(report)),
        OutputFormat::Tree => Ok(render_tree(report)),
        OutputFormat::Json => serde_json::to_string_pretty(report),
    }
}

/// Summary table, followed by the full tool output of every failed step and
/// a pass/fail count.
pub fn render_table(report: &SuiteReport) -> String {
    let rows: Vec<CaseRow> = report.cases.iter().map(CaseRow::from_report).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());

    let mut rendered = table.to_string();
    for diagnostic in report.cases.iter().flat_map(diagnostics) {
        rendered.push_str("\n\n");
        rendered.push_str(&diagnostic);
    }
    rendered.push_str(&format!(
        "\n{} passed, {} failed",
        report.passed_count(),
        report.cases.len() - report.passed_count()
    ));
    rendered
}

fn diagnostics(report: &LifecycleReport) -> impl Iterator<Item = String> + '_ {
    report.steps.iter().filter_map(|outcome| {
        let error = outcome.error.as_deref()?;
        Some(format!("{}: {} failed\n{}", report.name, outcome.step, error.trim_end()))
    })
}

#[derive(Tabled)]
struct RetryableRow {
    pattern: &'static str,
    reason: &'static str,
}

pub fn render_retryable_errors(entries: &[(&'static str, &'static str)]) -> String {
    let rows = entries
        .iter()
        .map(|&(pattern, reason)| RetryableRow { pattern, reason });
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

pub fn render_tree(report: &SuiteReport) -> String {
    report
        .cases
        .iter()
        .map(|case| case_tree(case).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn case_tree(report: &LifecycleReport) -> Tree<String> {
    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    let root = format!("{} ({}) {verdict}", report.name, report.dir.display());
    Tree::new(root).with_leaves(report.steps.iter().map(step_leaf))
}

fn step_leaf(outcome: &StepOutcome) -> Tree<String> {
    let marker = match outcome.status {
        StepStatus::Passed => "ok",
        StepStatus::Failed => "FAILED",
        StepStatus::Skipped => "skipped",
    };
    let mut label = format!("{} {marker}", outcome.step);
    if let Some(resources) = outcome.resources {
        label.push_str(&format!(" [{resources}]"));
    }

    let error_lines = outcome
        .error
        .iter()
        .flat_map(|error| error.lines())
        .filter(|line| !line.trim().is_empty())
        .map(|line| Tree::new(line.to_string()));
    Tree::new(label).with_leaves(error_lines)
}
