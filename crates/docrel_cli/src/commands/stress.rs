//! Stress command implementation.

use docrel_core::{Config, FieldType, ImmutableMetaSnapshot};
use docrel_testkit::{stress_concurrent_field_adds, StressConfig, TestManager};

/// Runs the stress command.
pub fn run(
    threads: usize,
    fields_per_thread: usize,
    max_attempts: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if threads == 0 {
        return Err("At least one thread is required".into());
    }

    let config = Config::default().max_attempts(max_attempts);
    let tm = TestManager::with_snapshot(ImmutableMetaSnapshot::empty(), config);
    let stress = StressConfig {
        threads,
        fields_per_thread,
        field_type: FieldType::String,
    };

    let report = stress_concurrent_field_adds(&tm.manager, &tm.backend, &stress)?;
    let backend = tm.backend.stats();

    match format {
        "json" => {
            let output = serde_json::json!({
                "report": report,
                "consistent": report.is_consistent(),
                "backend": {
                    "opened": backend.opened,
                    "committed": backend.committed,
                    "rolled_back": backend.rolled_back,
                    "closed": backend.closed,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            report
                .result
                .print_summary(&format!("{threads} shared writers x {fields_per_thread} fields"));
            println!("Versions: {} -> {}", report.start_version, report.final_version);
            println!(
                "Backend: {} committed, {} rolled back",
                backend.committed, backend.rolled_back
            );
            if !report.missing_fields.is_empty() {
                println!("Missing fields: {}", report.missing_fields.join(", "));
            }
        }
    }

    if report.is_consistent() {
        Ok(())
    } else {
        Err("Stress run left an inconsistent history".into())
    }
}
