//! Sequential human-readable identifier allocation.
//!
//! Identifiers look like `STU-2025-0007`: a fixed per-kind prefix, the
//! calendar year at allocation time, and a zero-padded sequence that is
//! unique per (prefix, year). The store's primary-key constraint is the
//! source of truth for uniqueness; this module only proposes candidates
//! likely to be free and retries past ones that are already taken. The
//! claiming insert belongs to the caller, which must re-run allocation if
//! that insert loses a race (see the creation handlers).

use chrono::Datelike;

/// Sequence width in digits. Lexicographic max-key lookups only agree with
/// numeric order while every sequence fits in this width, so exceeding it
/// is a hard error rather than a wider key.
const SEQ_WIDTH: usize = 4;
const MAX_SEQ: u32 = 9999;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Student,
    Teacher,
}

impl EntityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Student => "STU",
            EntityKind::Teacher => "TCH",
        }
    }
}

/// Read-only view of the collection that owns the uniqueness constraint.
pub trait KeyedStore {
    /// Greatest key (lexicographically) among keys starting with `prefix`.
    fn max_key_with_prefix(&self, prefix: &str) -> anyhow::Result<Option<String>>;

    fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("no free identifier under {prefix} after {attempts} attempts")]
    Exhausted { prefix: String, attempts: u32 },

    #[error("sequence for {prefix} exceeded the 4-digit budget")]
    SequenceOverflow { prefix: String },

    #[error("identifier store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

/// Allocate the next free identifier for `kind`, dated with the caller's
/// current calendar year.
pub fn allocate<S: KeyedStore>(store: &S, kind: EntityKind) -> Result<String, AllocError> {
    allocate_at(store, kind, chrono::Local::now().year(), DEFAULT_MAX_ATTEMPTS)
}

/// Year- and budget-explicit variant of [`allocate`].
///
/// Performs no writes. Returns `Exhausted` once `max_attempts` candidates
/// have all been found occupied, and `SequenceOverflow` instead of emitting
/// a key wider than the fixed padding.
pub fn allocate_at<S: KeyedStore>(
    store: &S,
    kind: EntityKind,
    year: i32,
    max_attempts: u32,
) -> Result<String, AllocError> {
    let prefix = format!("{}-{}", kind.prefix(), year);

    let last = store
        .max_key_with_prefix(&prefix)
        .map_err(AllocError::StoreUnavailable)?;

    let mut sequence = match last.as_deref() {
        None => 1,
        Some(key) => match trailing_sequence(key) {
            Some(n) => n + 1,
            None => {
                // Legacy or hand-entered key that doesn't carry a numeric
                // tail. Start a fresh sequence; the exists loop below still
                // protects against collisions.
                tracing::warn!(key, "max key has no parseable sequence; restarting at 1");
                1
            }
        },
    };

    let mut attempts = 0;
    while attempts < max_attempts {
        if sequence > MAX_SEQ {
            return Err(AllocError::SequenceOverflow { prefix });
        }
        let candidate = format!("{}-{:0width$}", prefix, sequence, width = SEQ_WIDTH);
        let taken = store
            .exists(&candidate)
            .map_err(AllocError::StoreUnavailable)?;
        if !taken {
            return Ok(candidate);
        }
        sequence += 1;
        attempts += 1;
    }

    Err(AllocError::Exhausted {
        prefix,
        attempts: max_attempts,
    })
}

/// Last-resort identifier for when the store cannot be queried at all.
///
/// The `T` marker keeps these visibly distinct from sequential identifiers
/// (and unparseable as a sequence), so relaxed-uniqueness ids can be found
/// later. Only the creation flow issues these, and only on
/// [`AllocError::StoreUnavailable`] — never on exhaustion.
pub fn degraded_identifier(kind: EntityKind, year: i32) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}-{}-T{:06}", kind.prefix(), year, millis.rem_euclid(1_000_000))
}

fn trailing_sequence(key: &str) -> Option<u32> {
    let tail = key.rsplit('-').next()?;
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// In-memory stand-in for the workspace table, with the same atomic
    /// insert-if-absent the real primary key provides.
    struct MemStore {
        keys: Mutex<BTreeSet<String>>,
    }

    impl MemStore {
        fn new() -> Self {
            MemStore {
                keys: Mutex::new(BTreeSet::new()),
            }
        }

        fn with_keys(keys: &[&str]) -> Self {
            MemStore {
                keys: Mutex::new(keys.iter().map(|s| s.to_string()).collect()),
            }
        }

        fn try_claim(&self, key: &str) -> bool {
            self.keys.lock().unwrap().insert(key.to_string())
        }
    }

    impl KeyedStore for MemStore {
        fn max_key_with_prefix(&self, prefix: &str) -> anyhow::Result<Option<String>> {
            let keys = self.keys.lock().unwrap();
            Ok(keys
                .iter()
                .filter(|k| k.starts_with(prefix))
                .next_back()
                .cloned())
        }

        fn exists(&self, key: &str) -> anyhow::Result<bool> {
            Ok(self.keys.lock().unwrap().contains(key))
        }
    }

    /// Store whose existence check always reports "taken".
    struct AlwaysTaken {
        checks: Mutex<u32>,
    }

    impl KeyedStore for AlwaysTaken {
        fn max_key_with_prefix(&self, _prefix: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            *self.checks.lock().unwrap() += 1;
            Ok(true)
        }
    }

    struct Unreachable;

    impl KeyedStore for Unreachable {
        fn max_key_with_prefix(&self, _prefix: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("connection refused")
        }

        fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn sequential_allocation_counts_from_one() {
        let store = MemStore::new();
        for n in 1..=8u32 {
            let id = allocate_at(&store, EntityKind::Student, 2025, 100).expect("allocate");
            assert_eq!(id, format!("STU-2025-{:04}", n));
            assert!(store.try_claim(&id));
        }
    }

    #[test]
    fn continues_from_max_without_backfilling_gaps() {
        let store = MemStore::with_keys(&["STU-2025-0001", "STU-2025-0003"]);
        let id = allocate_at(&store, EntityKind::Student, 2025, 100).expect("allocate");
        assert_eq!(id, "STU-2025-0004");
    }

    #[test]
    fn sequence_resets_on_year_rollover() {
        let store = MemStore::with_keys(&["STU-2024-0050"]);
        let id = allocate_at(&store, EntityKind::Student, 2025, 100).expect("allocate");
        assert_eq!(id, "STU-2025-0001");
    }

    #[test]
    fn retries_past_occupied_candidates() {
        // Simulates the max-key lookup racing behind other inserts: seed the
        // loop at 1 by hiding the real max from the prefix query.
        struct StaleMax(MemStore);
        impl KeyedStore for StaleMax {
            fn max_key_with_prefix(&self, _prefix: &str) -> anyhow::Result<Option<String>> {
                Ok(None)
            }
            fn exists(&self, key: &str) -> anyhow::Result<bool> {
                self.0.exists(key)
            }
        }

        let store = StaleMax(MemStore::with_keys(&[
            "STU-2025-0001",
            "STU-2025-0002",
            "STU-2025-0003",
            "STU-2025-0004",
            "STU-2025-0005",
        ]));
        let id = allocate_at(&store, EntityKind::Student, 2025, 100).expect("allocate");
        assert_eq!(id, "STU-2025-0006");
    }

    #[test]
    fn exhaustion_after_exactly_max_attempts() {
        let store = AlwaysTaken {
            checks: Mutex::new(0),
        };
        let err = allocate_at(&store, EntityKind::Student, 2025, 5).unwrap_err();
        match err {
            AllocError::Exhausted { prefix, attempts } => {
                assert_eq!(prefix, "STU-2025");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(*store.checks.lock().unwrap(), 5);
    }

    #[test]
    fn malformed_max_key_restarts_sequence() {
        let store = MemStore::with_keys(&["STU-2025-LEGACY"]);
        let id = allocate_at(&store, EntityKind::Student, 2025, 100).expect("allocate");
        assert_eq!(id, "STU-2025-0001");
    }

    #[test]
    fn overflow_is_an_error_not_a_wider_key() {
        let store = MemStore::with_keys(&["STU-2025-9999"]);
        let err = allocate_at(&store, EntityKind::Student, 2025, 100).unwrap_err();
        assert!(matches!(err, AllocError::SequenceOverflow { .. }));
    }

    #[test]
    fn store_failure_propagates_as_unavailable() {
        let err = allocate_at(&Unreachable, EntityKind::Teacher, 2025, 100).unwrap_err();
        assert!(matches!(err, AllocError::StoreUnavailable(_)));
    }

    #[test]
    fn teacher_prefix_is_independent_namespace() {
        let store = MemStore::with_keys(&["STU-2025-0009"]);
        let id = allocate_at(&store, EntityKind::Teacher, 2025, 100).expect("allocate");
        assert_eq!(id, "TCH-2025-0001");
    }

    #[test]
    fn degraded_identifier_never_parses_as_sequence() {
        let id = degraded_identifier(EntityKind::Student, 2025);
        assert!(id.starts_with("STU-2025-T"));
        assert_eq!(trailing_sequence(&id), None);
    }

    #[test]
    fn concurrent_allocations_are_pairwise_distinct() {
        let store = MemStore::new();
        let threads = 8;
        let per_thread = 40u32;

        std::thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    for _ in 0..per_thread {
                        // Caller-side contract: re-allocate when the claim
                        // loses the race between exists check and insert.
                        loop {
                            let id = allocate_at(&store, EntityKind::Student, 2025, 1000)
                                .expect("allocate");
                            if store.try_claim(&id) {
                                break;
                            }
                        }
                    }
                });
            }
        });

        let keys = store.keys.lock().unwrap();
        let total = threads * per_thread as usize;
        assert_eq!(keys.len(), total);
        // Claims always extend the max, so the final set is contiguous.
        for n in 1..=total as u32 {
            assert!(keys.contains(&format!("STU-2025-{:04}", n)));
        }
    }
}
