//! Scenario command implementation.

use docrel_core::{CoreError, SnapshotDump};
use docrel_testkit::scenarios::Scenario;
use docrel_testkit::sample_snapshot;
use serde::Serialize;
use tracing::info;

/// Outcome of one scenario step.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// Scenario letter.
    pub step: char,
    /// Scenario name.
    pub name: &'static str,
    /// Whether the merge behaved as expected.
    pub as_expected: bool,
    /// Rule that rejected the changes, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Conflict message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Merged snapshot, if the merge succeeded and it was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<SnapshotDump>,
}

/// Runs the scenario command.
pub fn run(step: Option<&str>, show_snapshot: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenarios = match step {
        None | Some("all") => Scenario::ALL.to_vec(),
        Some(value) => vec![Scenario::parse(value).ok_or_else(|| format!("Unknown scenario: {value}"))?],
    };

    let reports: Vec<ScenarioReport> = scenarios
        .into_iter()
        .map(|scenario| report(scenario, show_snapshot))
        .collect();

    match format {
        "json" => {
            let sample = SnapshotDump::from(&sample_snapshot());
            let output = serde_json::json!({ "sample": sample, "scenarios": reports });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_text_output(&reports),
    }

    if reports.iter().all(|r| r.as_expected) {
        Ok(())
    } else {
        Err("Some scenarios did not behave as expected".into())
    }
}

fn report(scenario: Scenario, show_snapshot: bool) -> ScenarioReport {
    let outcome = scenario.run();
    let as_expected = match (&outcome, scenario.expected_rule()) {
        (Ok(_), None) => true,
        (Err(err), Some(expected)) => err.rule() == Some(expected),
        _ => false,
    };
    info!(%scenario, as_expected, "ran scenario");

    let mut report = ScenarioReport {
        step: scenario.letter(),
        name: scenario.name(),
        as_expected,
        rule: None,
        message: None,
        merged: None,
    };
    match outcome {
        Ok(merged) => {
            if show_snapshot {
                report.merged = Some(SnapshotDump::from(&merged));
            }
        }
        Err(CoreError::Unmergeable { rule, message }) => {
            report.rule = Some(rule.to_string());
            report.message = Some(message);
        }
        Err(other) => report.message = Some(other.to_string()),
    }
    report
}

fn print_text_output(reports: &[ScenarioReport]) {
    println!("=== Merge Scenarios ===");
    for report in reports {
        let verdict = if report.as_expected { "ok" } else { "UNEXPECTED" };
        let outcome = match &report.rule {
            Some(rule) => format!("rejected by {rule}"),
            None if report.message.is_some() => "failed".to_string(),
            None => "merged".to_string(),
        };
        println!("({}) {:<20} {:<32} {}", report.step, report.name, outcome, verdict);
        if let Some(message) = &report.message {
            println!("    {message}");
        }
        if let Some(merged) = &report.merged {
            for database in &merged.databases {
                for collection in &database.collections {
                    for doc_part in &collection.doc_parts {
                        let fields: Vec<_> = doc_part
                            .fields
                            .iter()
                            .map(|f| format!("{}:{}", f.name(), f.field_type()))
                            .collect();
                        println!(
                            "    {}.{}.{} [{}]",
                            database.name,
                            collection.name,
                            doc_part.table_ref,
                            fields.join(", ")
                        );
                    }
                }
            }
        }
    }
}
