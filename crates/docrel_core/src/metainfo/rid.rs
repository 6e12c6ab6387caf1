//! Row id reservation.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::read::MetaDocPartRead;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RidKey {
    database: String,
    collection: String,
    doc_part: String,
}

/// Hands out unique row ids per doc part, across all transactions.
///
/// Row ids cannot go through the optimistic merge: two shared writers
/// inserting into the same table at the same time would both pick
/// `last_rid + 1`. Counters live here instead and the snapshot only keeps
/// the high-water mark.
#[derive(Debug, Default)]
pub struct RidGenerator {
    counters: RwLock<HashMap<RidKey, Arc<AtomicU64>>>,
}

impl RidGenerator {
    /// Creates a generator with no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: RidKey) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.read().get(&key) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write();
        Arc::clone(
            counters
                .entry(key)
                .or_insert_with(|| Arc::new(AtomicU64::new(0))),
        )
    }

    /// Reserves `count` consecutive row ids for `doc_part`.
    ///
    /// The counter never goes below the doc part's committed `last_rid`.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if the range would run past `u64::MAX`.
    pub fn reserve(
        &self,
        database_identifier: &str,
        collection_identifier: &str,
        doc_part: &dyn MetaDocPartRead,
        count: u64,
    ) -> CoreResult<Range<u64>> {
        let counter = self.counter(RidKey {
            database: database_identifier.to_owned(),
            collection: collection_identifier.to_owned(),
            doc_part: doc_part.identifier().to_owned(),
        });
        let floor = doc_part.last_rid();
        // The end of the range is `next + 1`, so `next` must stay below MAX.
        let reserved = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            last.max(floor).checked_add(count).filter(|next| *next < u64::MAX)
        });
        match reserved {
            Ok(previous) => {
                let last = previous.max(floor);
                Ok((last + 1)..(last + 1 + count))
            }
            Err(last) => Err(CoreError::illegal_argument(format!(
                "cannot reserve {count} row ids in doc part {} after row id {}",
                doc_part.identifier(),
                last.max(floor)
            ))),
        }
    }

    /// Drops every counter of a database, e.g. after it was removed.
    pub fn forget_database(&self, database_identifier: &str) {
        self.counters
            .write()
            .retain(|key, _| key.database != database_identifier);
    }

    /// Number of doc parts with a live counter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    /// Returns true if no counter was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::doc_part::MetaDocPart;
    use crate::metainfo::table_ref::TableRef;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn ranges_are_consecutive() {
        let generator = RidGenerator::new();
        let doc_part = MetaDocPart::new(TableRef::root(), "t");
        assert_eq!(generator.reserve("d", "c", &doc_part, 3).unwrap(), 1..4);
        assert_eq!(generator.reserve("d", "c", &doc_part, 2).unwrap(), 4..6);
        assert_eq!(generator.len(), 1);
    }

    #[test]
    fn seeded_from_committed_last_rid() {
        let generator = RidGenerator::new();
        let doc_part = MetaDocPart::builder(TableRef::root(), "t")
            .raise_last_rid(41)
            .build();
        assert_eq!(generator.reserve("d", "c", &doc_part, 1).unwrap(), 42..43);
    }

    #[test]
    fn exhausted_range_is_rejected() {
        let generator = RidGenerator::new();
        let doc_part = MetaDocPart::builder(TableRef::root(), "t")
            .raise_last_rid(u64::MAX - 2)
            .build();
        assert_eq!(
            generator.reserve("d", "c", &doc_part, 1).unwrap(),
            (u64::MAX - 1)..u64::MAX
        );
        let err = generator.reserve("d", "c", &doc_part, 1).unwrap_err();
        assert!(matches!(err, CoreError::IllegalArgument { .. }));

        let fresh = MetaDocPart::new(TableRef::root(), "u");
        assert!(generator.reserve("d", "c", &fresh, u64::MAX).is_err());
        assert_eq!(generator.reserve("d", "c", &fresh, 2).unwrap(), 1..3);
    }

    #[test]
    fn forget_database_drops_counters() {
        let generator = RidGenerator::new();
        let doc_part = MetaDocPart::new(TableRef::root(), "t");
        generator.reserve("d1", "c", &doc_part, 1).unwrap();
        generator.reserve("d2", "c", &doc_part, 1).unwrap();
        generator.forget_database("d1");
        assert_eq!(generator.len(), 1);
        assert_eq!(generator.reserve("d1", "c", &doc_part, 1).unwrap(), 1..2);
    }

    #[test]
    fn concurrent_reservations_never_overlap() {
        let generator = Arc::new(RidGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || {
                    let doc_part = MetaDocPart::new(TableRef::root(), "t");
                    (0..100)
                        .flat_map(|_| generator.reserve("d", "c", &doc_part, 2).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for rid in handle.join().unwrap() {
                assert!(seen.insert(rid), "rid {rid} handed out twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
