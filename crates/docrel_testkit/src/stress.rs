//! Stress tests for the metadata engine.
//!
//! These drive many writers through the shared lock at once and check that
//! every change lands and that versions advance one commit at a time.

use docrel_backend::BackendConnection;
use docrel_core::{
    CoreResult, FieldType, InternalTransactionManager, MetaCollectionRead, MetaDatabaseRead,
    MetaDocPartRead, MetaSnapshotRead, RetryHint, SnapshotVersion, TableRef,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Database the stress tests write into.
pub const STRESS_DATABASE: &str = "stress";
/// Collection the stress tests write into.
pub const STRESS_COLLECTION: &str = "fields";

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[must_use]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent writer threads.
    pub threads: usize,
    /// Fields each writer adds, one transaction per field.
    pub fields_per_thread: usize,
    /// Type of every added field.
    pub field_type: FieldType,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            fields_per_thread: 25,
            field_type: FieldType::String,
        }
    }
}

/// What a field stress run left behind.
#[derive(Debug, Clone, Serialize)]
pub struct FieldStressReport {
    /// Throughput figures.
    pub result: StressTestResult,
    /// Version before the writers started.
    pub start_version: SnapshotVersion,
    /// Version after every writer finished.
    pub final_version: SnapshotVersion,
    /// Fields that were committed but are missing from the final snapshot.
    pub missing_fields: Vec<String>,
    /// Times a reader saw the version go backwards.
    pub version_regressions: usize,
}

impl FieldStressReport {
    /// Returns true if every committed field is visible and each commit
    /// advanced the version by exactly one.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing_fields.is_empty()
            && self.version_regressions == 0
            && self.final_version.as_u64() - self.start_version.as_u64()
                == self.result.successful_ops as u64
    }
}

fn field_name(thread: usize, i: usize) -> String {
    format!("t{thread}_f{i}")
}

/// Run concurrent shared writers, each adding its own fields to one doc part.
///
/// A reader thread polls the repository meanwhile to catch versions going
/// backwards.
///
/// # Errors
///
/// Returns an error if the collection cannot be created up front.
pub fn stress_concurrent_field_adds<C>(
    manager: &Arc<InternalTransactionManager>,
    conn: &C,
    config: &StressConfig,
) -> CoreResult<FieldStressReport>
where
    C: BackendConnection + Clone + Send + 'static,
{
    manager.run_in_shared_write(conn, RetryHint::InfrequentRollback, |snapshot, factory| {
        snapshot
            .get_or_create_collection(factory, STRESS_DATABASE, STRESS_COLLECTION)
            .map(|_| ())
    })?;
    let start_version = manager.repository().current_version();

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let writers_left = Arc::new(AtomicUsize::new(config.threads));
    let start = Instant::now();

    let reader = {
        let manager = Arc::clone(manager);
        let writers_left = Arc::clone(&writers_left);
        thread::spawn(move || {
            let mut regressions = 0usize;
            let mut seen = manager.repository().current_version();
            while writers_left.load(Ordering::Acquire) > 0 {
                let version = manager.repository().current_version();
                if version < seen {
                    regressions += 1;
                }
                seen = seen.max(version);
                thread::yield_now();
            }
            regressions
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let manager = Arc::clone(manager);
            let conn = conn.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let writers_left = Arc::clone(&writers_left);
            let config = config.clone();

            thread::spawn(move || {
                let root = TableRef::root();
                for i in 0..config.fields_per_thread {
                    let name = field_name(t, i);
                    let added = manager.run_in_shared_write(
                        &conn,
                        RetryHint::FrequentRollback,
                        |snapshot, factory| {
                            snapshot.get_or_create_field(
                                factory,
                                STRESS_DATABASE,
                                STRESS_COLLECTION,
                                &root,
                                &name,
                                config.field_type,
                            )
                        },
                    );
                    match added {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
                writers_left.fetch_sub(1, Ordering::Release);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    let version_regressions = reader.join().expect("Thread panicked");
    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );

    let snapshot = manager.repository().current_snapshot();
    let root = snapshot
        .database_by_name(STRESS_DATABASE)
        .and_then(|d| d.collection_by_name(STRESS_COLLECTION))
        .and_then(|c| c.doc_part_by_table_ref(&TableRef::root()));
    let missing_fields = (0..config.threads)
        .flat_map(|t| (0..config.fields_per_thread).map(move |i| field_name(t, i)))
        .filter(|name| {
            root.and_then(|doc_part| doc_part.field_by_name_and_type(name, config.field_type))
                .is_none()
        })
        .collect();

    Ok(FieldStressReport {
        result,
        start_version,
        final_version: snapshot.version(),
        missing_fields,
        version_regressions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestManager;

    #[test]
    fn concurrent_field_adds_all_land() {
        let tm = TestManager::new();
        let config = StressConfig {
            threads: 4,
            fields_per_thread: 10,
            field_type: FieldType::Integer,
        };

        let report = stress_concurrent_field_adds(&tm.manager, &tm.backend, &config).unwrap();

        assert_eq!(report.result.successful_ops, 40);
        assert_eq!(report.result.failed_ops, 0);
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.final_version, SnapshotVersion::new(41));
    }

    #[test]
    fn report_flags_missing_fields() {
        let report = FieldStressReport {
            result: StressTestResult::new(1, 0, Duration::from_millis(1)),
            start_version: SnapshotVersion::new(1),
            final_version: SnapshotVersion::new(2),
            missing_fields: vec!["t0_f0".into()],
            version_regressions: 0,
        };
        assert!(!report.is_consistent());
    }
}
