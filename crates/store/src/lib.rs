//! In-process working context store.
//!
//! A bounded, priority-ordered multiset of context entries for the active
//! session. All operations are synchronous with no I/O side effects; the
//! store is meant to have a single logical owner (the session controller).
//! Shared use across concurrent callers requires an external mutex so that
//! add-with-eviction stays atomic.
//!
//! Overflow policy: when an insert pushes the count past the configured
//! maximum, the single lowest-priority entry is evicted, ties broken by
//! oldest `created_at`, then by insertion order.

pub mod search;

pub use search::{ContextSearch, SearchOptions};

use memwell_core::{ContextEntry, ContextKind, EntryPatch, StoreError};
use tracing::debug;

/// Bounds for the working store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of entries held at once.
    pub max_entries: usize,
    /// Maximum content length per entry, in characters.
    pub max_content_chars: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_content_chars: 500_000,
        }
    }
}

/// The working tier: low-latency context for the active session.
#[derive(Debug, Clone, Default)]
pub struct WorkingContextStore {
    // Insertion order is load-bearing: get_all_contexts and search return it,
    // and it breaks full ties during eviction and priority sorting.
    entries: Vec<ContextEntry>,
    limits: StoreLimits,
}

impl WorkingContextStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            entries: Vec::new(),
            limits,
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Insert an entry. Atomic: validation failures leave the store
    /// untouched. Returns the entry evicted to stay within bounds, if any.
    ///
    /// Errors: `InvalidId` for an empty id, `DuplicateId` when the id is
    /// already present, `SizeLimitExceeded` when the content is over the
    /// configured maximum.
    pub fn add_context(
        &mut self,
        entry: ContextEntry,
    ) -> Result<Option<ContextEntry>, StoreError> {
        if entry.id.is_empty() {
            return Err(StoreError::InvalidId);
        }
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::DuplicateId(entry.id));
        }
        self.check_content_len(&entry.content)?;

        self.entries.push(entry);
        Ok(self.evict_overflow())
    }

    /// Remove an entry by id. No-op (returns `false`) when absent.
    pub fn remove_context(&mut self, id: &str) -> bool {
        let len_before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() < len_before
    }

    /// Merge a partial update into an existing entry, preserving its id and
    /// `created_at`. Missing ids are rejected with `NotFound` — updates are
    /// a strict contract, never a silent insert.
    pub fn update_context(&mut self, id: &str, patch: EntryPatch) -> Result<(), StoreError> {
        if let Some(content) = &patch.content {
            self.check_content_len(content)?;
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(content) = patch.content {
            entry.content = content;
        }
        if let Some(metadata) = patch.metadata {
            entry.metadata = metadata;
        }
        if let Some(priority) = patch.priority {
            entry.priority = priority;
        }
        if let Some(importance) = patch.importance {
            entry.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(tokens) = patch.token_estimate {
            entry.token_estimate = tokens;
        }
        Ok(())
    }

    pub fn get_context(&self, id: &str) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// All entries in insertion order.
    pub fn get_all_contexts(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn get_contexts_by_kind(&self, kind: ContextKind) -> Vec<&ContextEntry> {
        self.entries.iter().filter(|e| e.kind() == kind).collect()
    }

    /// Entries by priority descending; equal priorities keep insertion order.
    pub fn get_sorted_contexts(&self) -> Vec<&ContextEntry> {
        let mut sorted: Vec<&ContextEntry> = self.entries.iter().collect();
        // Stable sort, so insertion order survives as the tie-breaker.
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted
    }

    /// Serialize the full entry set to JSON.
    pub fn export_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(&self.entries).map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Merge entries from a JSON export. Malformed input or invalid entries
    /// are rejected before any mutation; on success, entries merge by id with
    /// later entries overwriting earlier ones.
    pub fn import_json(&mut self, json: &str) -> Result<(), StoreError> {
        let incoming: Vec<ContextEntry> =
            serde_json::from_str(json).map_err(|e| StoreError::Parse(e.to_string()))?;

        for entry in &incoming {
            if entry.id.is_empty() {
                return Err(StoreError::InvalidId);
            }
            self.check_content_len(&entry.content)?;
        }

        for entry in incoming {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
                *existing = entry;
            } else {
                self.entries.push(entry);
                if let Some(evicted) = self.evict_overflow() {
                    debug!(id = %evicted.id, "evicted entry during import");
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_content_len(&self, content: &str) -> Result<(), StoreError> {
        let len = content.chars().count();
        if len > self.limits.max_content_chars {
            return Err(StoreError::SizeLimitExceeded {
                len,
                max: self.limits.max_content_chars,
            });
        }
        Ok(())
    }

    /// Evict the lowest-priority (oldest-on-tie) entry if the store is over
    /// its maximum. The just-inserted entry is itself a candidate.
    fn evict_overflow(&mut self) -> Option<ContextEntry> {
        if self.entries.len() <= self.limits.max_entries {
            return None;
        }
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.priority, e.created_at))
            .map(|(i, _)| i)?;
        let evicted = self.entries.remove(victim);
        debug!(id = %evicted.id, priority = evicted.priority, "evicted lowest-priority entry");
        Some(evicted)
    }
}

impl ContextSearch for WorkingContextStore {
    fn search_contexts(&self, query: &str, options: SearchOptions) -> Vec<&ContextEntry> {
        self.entries
            .iter()
            .filter(|e| {
                if e.content.contains(query) {
                    return true;
                }
                if options.search_metadata {
                    if let Ok(meta) = serde_json::to_string(&e.metadata) {
                        return meta.contains(query);
                    }
                }
                false
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use memwell_core::EntryMetadata;
    use std::collections::BTreeMap;

    fn entry(id: &str, kind: ContextKind, content: &str) -> ContextEntry {
        ContextEntry::new(id, kind, content)
    }

    fn small_store(max_entries: usize) -> WorkingContextStore {
        WorkingContextStore::new(StoreLimits {
            max_entries,
            ..StoreLimits::default()
        })
    }

    #[test]
    fn search_finds_exactly_the_matching_entry() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("f1", ContextKind::File, "typescript content"))
            .unwrap();
        store
            .add_context(entry("f2", ContextKind::File, "rust content"))
            .unwrap();

        let hits = store.search_contexts("typescript", SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f1");
    }

    #[test]
    fn search_is_case_sensitive() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("f1", ContextKind::File, "TypeScript content"))
            .unwrap();
        assert!(store
            .search_contexts("typescript", SearchOptions::default())
            .is_empty());
    }

    #[test]
    fn search_can_include_metadata() {
        let mut store = WorkingContextStore::default();
        let e = entry("f1", ContextKind::File, "fn main() {}").with_metadata(
            EntryMetadata::File {
                path: Some("src/widget.rs".into()),
                language: Some("rust".into()),
                extra: BTreeMap::new(),
            },
        );
        store.add_context(e).unwrap();

        assert!(store
            .search_contexts("widget", SearchOptions::default())
            .is_empty());
        let hits = store.search_contexts(
            "widget",
            SearchOptions {
                search_metadata: true,
            },
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overflow_evicts_oldest_of_equal_priority() {
        let mut store = small_store(2);
        let now = Utc::now();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut e = entry(id, ContextKind::Conversation, "msg");
            e.created_at = now + Duration::seconds(i as i64);
            store.add_context(e).unwrap();
        }

        assert_eq!(store.get_all_contexts().len(), 2);
        assert!(store.get_context("a").is_none(), "oldest should be evicted");
        assert!(store.get_context("b").is_some());
        assert!(store.get_context("c").is_some());
    }

    #[test]
    fn overflow_evicts_lowest_priority_first() {
        let mut store = small_store(2);
        store
            .add_context(entry("low", ContextKind::Conversation, "x").with_priority(1))
            .unwrap();
        store
            .add_context(entry("high", ContextKind::Conversation, "x").with_priority(10))
            .unwrap();
        let evicted = store
            .add_context(entry("mid", ContextKind::Conversation, "x").with_priority(5))
            .unwrap();

        assert_eq!(evicted.unwrap().id, "low");
        assert!(store.get_context("high").is_some());
        assert!(store.get_context("mid").is_some());
    }

    #[test]
    fn new_entry_can_be_its_own_eviction_victim() {
        let mut store = small_store(2);
        store
            .add_context(entry("a", ContextKind::Conversation, "x").with_priority(10))
            .unwrap();
        store
            .add_context(entry("b", ContextKind::Conversation, "x").with_priority(10))
            .unwrap();
        let evicted = store
            .add_context(entry("weak", ContextKind::Conversation, "x").with_priority(0))
            .unwrap();
        assert_eq!(evicted.unwrap().id, "weak");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn count_never_exceeds_maximum() {
        let mut store = small_store(5);
        for i in 0..50 {
            store
                .add_context(entry(
                    &format!("e{i}"),
                    ContextKind::ToolOutput,
                    "output",
                ))
                .unwrap();
            assert!(store.len() <= 5);
        }
    }

    #[test]
    fn duplicate_id_rejected_without_mutation() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("dup", ContextKind::File, "original"))
            .unwrap();

        let err = store
            .add_context(entry("dup", ContextKind::File, "replacement"))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateId("dup".into()));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_context("dup").unwrap().content, "original");
    }

    #[test]
    fn empty_id_rejected() {
        let mut store = WorkingContextStore::default();
        let err = store
            .add_context(entry("", ContextKind::File, "content"))
            .unwrap_err();
        assert_eq!(err, StoreError::InvalidId);
        assert!(store.is_empty());
    }

    #[test]
    fn oversized_content_rejected() {
        let mut store = WorkingContextStore::new(StoreLimits {
            max_entries: 10,
            max_content_chars: 8,
        });
        let err = store
            .add_context(entry("big", ContextKind::File, "123456789"))
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeLimitExceeded { len: 9, max: 8 }));
        assert!(store.is_empty());
    }

    #[test]
    fn update_missing_id_is_rejected_not_merged() {
        let mut store = WorkingContextStore::default();
        let err = store
            .update_context("ghost", EntryPatch::content("new content"))
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost".into()));
        assert!(store.is_empty(), "a rejected update must not insert");
    }

    #[test]
    fn update_merges_fields_and_preserves_identity() {
        let mut store = WorkingContextStore::default();
        let original = entry("e1", ContextKind::File, "v1").with_priority(3);
        let created_at = original.created_at;
        store.add_context(original).unwrap();

        store
            .update_context(
                "e1",
                EntryPatch {
                    content: Some("v2".into()),
                    importance: Some(0.9),
                    ..EntryPatch::default()
                },
            )
            .unwrap();

        let updated = store.get_context("e1").unwrap();
        assert_eq!(updated.content, "v2");
        assert_eq!(updated.importance, 0.9);
        assert_eq!(updated.priority, 3, "unpatched fields survive");
        assert_eq!(updated.created_at, created_at);
    }

    #[test]
    fn update_validates_content_size_before_mutating() {
        let mut store = WorkingContextStore::new(StoreLimits {
            max_entries: 10,
            max_content_chars: 4,
        });
        store
            .add_context(entry("e1", ContextKind::File, "ok"))
            .unwrap();

        let err = store
            .update_context("e1", EntryPatch::content("too long"))
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeLimitExceeded { .. }));
        assert_eq!(store.get_context("e1").unwrap().content, "ok");
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let mut store = WorkingContextStore::default();
        assert!(!store.remove_context("nothing"));
        store
            .add_context(entry("e1", ContextKind::File, "x"))
            .unwrap();
        assert!(store.remove_context("e1"));
        assert!(store.is_empty());
    }

    #[test]
    fn all_contexts_keep_insertion_order() {
        let mut store = WorkingContextStore::default();
        for id in ["z", "a", "m"] {
            store
                .add_context(entry(id, ContextKind::Conversation, "x"))
                .unwrap();
        }
        let ids: Vec<&str> = store
            .get_all_contexts()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn sorted_contexts_by_priority_then_insertion() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("a", ContextKind::File, "x").with_priority(1))
            .unwrap();
        store
            .add_context(entry("b", ContextKind::File, "x").with_priority(9))
            .unwrap();
        store
            .add_context(entry("c", ContextKind::File, "x").with_priority(9))
            .unwrap();

        let ids: Vec<&str> = store
            .get_sorted_contexts()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn filter_by_kind() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("f", ContextKind::File, "x"))
            .unwrap();
        store
            .add_context(entry("c", ContextKind::Conversation, "x"))
            .unwrap();
        store
            .add_context(entry("t", ContextKind::ToolOutput, "x"))
            .unwrap();

        let files = store.get_contexts_by_kind(ContextKind::File);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "f");
    }

    #[test]
    fn json_round_trip_reproduces_entries() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("f1", ContextKind::File, "file content").with_priority(2))
            .unwrap();
        store
            .add_context(entry("c1", ContextKind::Conversation, "a question"))
            .unwrap();

        let json = store.export_json().unwrap();
        let mut restored = WorkingContextStore::default();
        restored.import_json(&json).unwrap();

        assert_eq!(restored.len(), 2);
        for original in store.get_all_contexts() {
            let copy = restored.get_context(&original.id).unwrap();
            assert_eq!(copy, original);
        }
    }

    #[test]
    fn import_malformed_json_is_parse_error() {
        let mut store = WorkingContextStore::default();
        let err = store.import_json("{not json").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn import_merges_by_id_with_later_overwriting() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("e1", ContextKind::File, "old"))
            .unwrap();

        let incoming = vec![
            entry("e1", ContextKind::File, "new"),
            entry("e2", ContextKind::File, "fresh"),
        ];
        store
            .import_json(&serde_json::to_string(&incoming).unwrap())
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_context("e1").unwrap().content, "new");
        assert_eq!(store.get_context("e2").unwrap().content, "fresh");
    }

    #[test]
    fn import_rejects_invalid_entries_before_any_mutation() {
        let mut store = WorkingContextStore::new(StoreLimits {
            max_entries: 10,
            max_content_chars: 4,
        });
        let incoming = vec![
            entry("good", ContextKind::File, "ok"),
            entry("bad", ContextKind::File, "way too long"),
        ];
        let err = store
            .import_json(&serde_json::to_string(&incoming).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeLimitExceeded { .. }));
        assert!(store.is_empty(), "partial imports are not allowed");
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = WorkingContextStore::default();
        store
            .add_context(entry("e1", ContextKind::File, "x"))
            .unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
