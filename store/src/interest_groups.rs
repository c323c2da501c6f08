//! Interest Group Store - SQLite-backed keyed collection of interest groups.
//!
//! Each public operation runs as one transaction and reports whether it
//! committed. Failures are logged and surfaced as `false`; nothing here
//! retries.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde_json::Value;

use fledge_types::{Ad, InterestGroup, PartialInterestGroup};

use crate::codec;
use crate::sqlite_security::prepare_db_path;

/// Merge an incoming partial group over the existing one.
///
/// A field is overwritten only when the incoming value is present. A group
/// created from scratch gets an empty ad list rather than none.
#[must_use]
pub fn merge(existing: Option<InterestGroup>, incoming: &PartialInterestGroup) -> InterestGroup {
    let existing = existing.unwrap_or_else(|| InterestGroup::empty(incoming.name.clone()));
    InterestGroup {
        name: incoming.name.clone(),
        trusted_bidding_signals_url: incoming
            .trusted_bidding_signals_url
            .clone()
            .or(existing.trusted_bidding_signals_url),
        ads: incoming.ads.clone().unwrap_or(existing.ads),
    }
}

/// Keyed read/write access scoped to a single atomic transaction.
pub(crate) struct RecordTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl RecordTransaction<'_> {
    /// Raw stored text for `key`, if present.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.tx
            .query_row(
                "SELECT record FROM interest_groups WHERE name = ?1",
                [key],
                |row| row.get::<_, SqlValue>(0),
            )
            .optional()
            .with_context(|| format!("Failed to read interest group {key:?}"))
            .map(|value| value.map(sql_text))
    }

    pub fn put(&self, key: &str, record: &Value) -> Result<()> {
        self.put_text(key, &record.to_string())
    }

    fn put_text(&self, key: &str, record: &str) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO interest_groups (name, record) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET record = excluded.record",
                params![key, record],
            )
            .with_context(|| format!("Failed to write interest group {key:?}"))?;
        Ok(())
    }

    /// Delete `key`. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.tx
            .execute("DELETE FROM interest_groups WHERE name = ?1", [key])
            .with_context(|| format!("Failed to delete interest group {key:?}"))?;
        Ok(())
    }

    /// Visit every row in key order as `(key, raw record text)`.
    fn scan(&self, mut visit: impl FnMut(&str, &str)) -> Result<()> {
        let mut stmt = self
            .tx
            .prepare("SELECT name, record FROM interest_groups ORDER BY name")
            .context("Failed to prepare interest group scan")?;
        let mut rows = stmt.query([]).context("Failed to scan interest groups")?;
        while let Some(row) = rows.next().context("Failed to read interest group row")? {
            let key = sql_text(row.get::<_, SqlValue>(0)?);
            let record = sql_text(row.get::<_, SqlValue>(1)?);
            visit(&key, &record);
        }
        Ok(())
    }
}

/// Render any SQLite value as text so non-text rows decode as malformed
/// instead of aborting the scan.
fn sql_text(value: SqlValue) -> String {
    match value {
        SqlValue::Text(text) => text,
        SqlValue::Null => "null".to_string(),
        SqlValue::Integer(n) => n.to_string(),
        SqlValue::Real(n) => n.to_string(),
        SqlValue::Blob(bytes) => format!("<{} byte blob>", bytes.len()),
    }
}

/// Persistent store for interest groups.
///
/// The connection sits behind a mutex so one store can be shared through an
/// `Arc` by the dispatcher and the auction orchestrator.
pub struct InterestGroupStore {
    db: Mutex<Connection>,
}

impl InterestGroupStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS interest_groups (
            name TEXT PRIMARY KEY NOT NULL,
            record TEXT NOT NULL
        ) WITHOUT ROWID;
    ";

    /// Open or create the store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prepare_db_path(path)?;

        let db = Connection::open(path)
            .with_context(|| format!("Failed to open interest group store at {}", path.display()))?;
        tracing::info!(path = %path.display(), "Opened interest group store");
        Self::initialize(db)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db =
            Connection::open_in_memory().context("Failed to open in-memory interest group store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .context("Failed to set interest group store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create interest group store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Close the underlying connection, flushing any pending state.
    pub fn close(self) -> Result<()> {
        let db = self.db.into_inner().unwrap_or_else(PoisonError::into_inner);
        db.close()
            .map_err(|(_, err)| err)
            .context("Failed to close interest group store")?;
        tracing::info!("Closed interest group store");
        Ok(())
    }

    /// Store a group, merging over any existing group of the same name.
    ///
    /// Each field of the stored group is replaced only if `group` carries a
    /// value for it. There is no way to clear a field short of removing the
    /// whole group. An existing record that fails to decode is replaced as if
    /// it were absent.
    pub fn upsert_merge(&self, group: &PartialInterestGroup) -> bool {
        let name = group.name.as_str();
        self.commit("upsert", TransactionBehavior::Immediate, |tx| {
            let existing = tx
                .get(name)?
                .and_then(|raw| codec::decode_text(name, &raw));
            let merged = merge(existing, group);
            tx.put(name, &codec::encode(&merged))
        })
        .is_some()
    }

    /// Remove a group. Removing a group that does not exist still commits.
    pub fn remove(&self, name: &str) -> bool {
        self.commit("remove", TransactionBehavior::Immediate, |tx| {
            tx.delete(name)
        })
        .is_some()
    }

    /// Call `callback` for every well-formed group in key order.
    ///
    /// Malformed records are logged and skipped. Returns whether the whole
    /// scan committed.
    pub fn for_each(&self, mut callback: impl FnMut(InterestGroup)) -> bool {
        self.commit("scan", TransactionBehavior::Deferred, |tx| {
            tx.scan(|key, raw| {
                if let Some(group) = codec::decode_text(key, raw) {
                    callback(group);
                }
            })
        })
        .is_some()
    }

    /// Read one group. Absent and malformed records both read as `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<InterestGroup> {
        self.commit("get", TransactionBehavior::Deferred, |tx| tx.get(name))
            .flatten()
            .and_then(|raw| codec::decode_text(name, &raw))
    }

    /// Every ad of every well-formed group, in scan order.
    ///
    /// Returns `None` if the scan did not commit.
    #[must_use]
    pub fn all_ads(&self) -> Option<Vec<Ad>> {
        let mut ads = Vec::new();
        self.for_each(|group| ads.extend(group.ads))
            .then_some(ads)
    }

    /// Run `body` inside one transaction and commit it.
    ///
    /// Any failure rolls back (the transaction is dropped) and yields `None`.
    fn commit<T>(
        &self,
        operation: &'static str,
        behavior: TransactionBehavior,
        body: impl FnOnce(&RecordTransaction<'_>) -> Result<T>,
    ) -> Option<T> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let result = db
            .transaction_with_behavior(behavior)
            .context("Failed to start interest group transaction")
            .and_then(|tx| {
                let tx = RecordTransaction { tx };
                let value = body(&tx)?;
                tx.tx
                    .commit()
                    .context("Failed to commit interest group transaction")?;
                Ok(value)
            });
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(operation, "Interest group transaction aborted: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fledge_types::NonEmptyString;

    use super::*;

    fn name(value: &str) -> NonEmptyString {
        NonEmptyString::new(value).unwrap()
    }

    fn scan(store: &InterestGroupStore) -> Vec<InterestGroup> {
        let mut groups = Vec::new();
        assert!(store.for_each(|group| groups.push(group)));
        groups
    }

    fn put_raw(store: &InterestGroupStore, key: &str, raw: &str) {
        assert!(
            store
                .commit("test", TransactionBehavior::Immediate, |tx| tx.put_text(key, raw))
                .is_some()
        );
    }

    #[test]
    fn merge_creates_with_empty_ads() {
        let merged = merge(None, &PartialInterestGroup::named(name("g1")));
        assert_eq!(merged, InterestGroup::empty(name("g1")));
    }

    #[test]
    fn merge_keeps_fields_absent_from_incoming() {
        let existing = InterestGroup {
            name: name("g1"),
            trusted_bidding_signals_url: Some("https://x.test/bid".to_string()),
            ads: vec![Ad::new("about:blank", 0.02)],
        };

        let only_ads =
            PartialInterestGroup::named(name("g1")).with_ads(vec![Ad::new("about:blank#2", 1.0)]);
        let merged = merge(Some(existing.clone()), &only_ads);
        assert_eq!(
            merged.trusted_bidding_signals_url.as_deref(),
            Some("https://x.test/bid")
        );
        assert_eq!(merged.ads, vec![Ad::new("about:blank#2", 1.0)]);

        let only_url =
            PartialInterestGroup::named(name("g1")).with_trusted_bidding_signals_url("https://y");
        let merged = merge(Some(existing), &only_url);
        assert_eq!(merged.trusted_bidding_signals_url.as_deref(), Some("https://y"));
        assert_eq!(merged.ads, vec![Ad::new("about:blank", 0.02)]);
    }

    #[test]
    fn merge_with_empty_ads_clears_list() {
        let existing = InterestGroup {
            name: name("g1"),
            trusted_bidding_signals_url: None,
            ads: vec![Ad::new("about:blank", 0.02)],
        };
        let merged = merge(
            Some(existing),
            &PartialInterestGroup::named(name("g1")).with_ads(Vec::new()),
        );
        assert!(merged.ads.is_empty());
    }

    #[test]
    fn merge_sequence_matches_last_present_value_per_field() {
        let ad_a = Ad::new("about:blank#a", 0.1);
        let ad_b = Ad::new("about:blank#b", 0.2);
        let joins = [
            PartialInterestGroup::named(name("g1")),
            PartialInterestGroup::named(name("g1")).with_ads(vec![ad_a.clone()]),
            PartialInterestGroup::named(name("g1")).with_trusted_bidding_signals_url("https://x"),
            PartialInterestGroup::named(name("g1")),
            PartialInterestGroup::named(name("g1")).with_ads(vec![ad_b.clone()]),
            PartialInterestGroup::named(name("g1")).with_trusted_bidding_signals_url("https://y"),
        ];
        let expected: [(Option<&str>, Vec<Ad>); 6] = [
            (None, Vec::new()),
            (None, vec![ad_a.clone()]),
            (Some("https://x"), vec![ad_a.clone()]),
            (Some("https://x"), vec![ad_a]),
            (Some("https://x"), vec![ad_b.clone()]),
            (Some("https://y"), vec![ad_b]),
        ];

        let store = InterestGroupStore::open_in_memory().expect("open store");
        let mut folded = None;
        for (join, (url, ads)) in joins.iter().zip(expected) {
            let merged = merge(folded.take(), join);
            assert_eq!(merged.trusted_bidding_signals_url.as_deref(), url);
            assert_eq!(merged.ads, ads);

            assert!(store.upsert_merge(join));
            assert_eq!(scan(&store), vec![merged.clone()]);
            folded = Some(merged);
        }
    }

    #[test]
    fn whitespace_name_round_trips() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        let ads = vec![Ad::new("about:blank", 0.02)];
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("   ")).with_ads(ads.clone())));

        let groups = scan(&store);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name.as_str(), "   ");
        assert_eq!(store.get("   ").expect("group present").ads, ads);

        assert!(store.remove("   "));
        assert!(scan(&store).is_empty());
    }

    #[test]
    fn upsert_then_scan_returns_group() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        let ads = vec![Ad::new("about:blank", 0.02)];
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("g1")).with_ads(ads.clone())));

        let groups = scan(&store);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name.as_str(), "g1");
        assert_eq!(groups[0].ads, ads);
        assert!(groups[0].trusted_bidding_signals_url.is_none());
    }

    #[test]
    fn upsert_merges_into_existing_group() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        let ads = vec![Ad::new("about:blank", 0.02)];
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("g1")).with_ads(ads.clone())));
        assert!(store.upsert_merge(
            &PartialInterestGroup::named(name("g1"))
                .with_trusted_bidding_signals_url("https://x.test/bid")
        ));
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("g1"))));

        let group = store.get("g1").expect("group present");
        assert_eq!(group.ads, ads);
        assert_eq!(
            group.trusted_bidding_signals_url.as_deref(),
            Some("https://x.test/bid")
        );
    }

    #[test]
    fn upsert_over_malformed_record_starts_fresh() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        put_raw(&store, "g1", "{\"broken\": true}");
        assert!(store.get("g1").is_none());

        assert!(store.upsert_merge(
            &PartialInterestGroup::named(name("g1"))
                .with_trusted_bidding_signals_url("https://x.test/bid")
        ));
        let group = store.get("g1").expect("group repaired");
        assert!(group.ads.is_empty());
        assert_eq!(
            group.trusted_bidding_signals_url.as_deref(),
            Some("https://x.test/bid")
        );
    }

    #[test]
    fn remove_deletes_group() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("g1"))));
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("g2"))));
        assert!(store.remove("g1"));

        let names: Vec<String> = scan(&store).into_iter().map(|g| g.name.into_inner()).collect();
        assert_eq!(names, vec!["g2".to_string()]);
    }

    #[test]
    fn remove_absent_group_still_commits() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        assert!(store.remove("nobody"));
        assert!(scan(&store).is_empty());
    }

    #[test]
    fn scan_skips_malformed_records_in_order() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        put_raw(&store, "a", "[null, [[\"about:blank#1\", 0.01]]]");
        put_raw(&store, "b", "[null, [[\"about:blank#2\"]]]");
        put_raw(&store, "c", "[\"https://x.test/bid\", []]");
        put_raw(&store, "d", "definitely not json");
        put_raw(&store, "e", "[null, [[\"about:blank#3\", 0.03]]]");

        let names: Vec<String> = scan(&store).into_iter().map(|g| g.name.into_inner()).collect();
        assert_eq!(names, vec!["a", "c", "e"]);
    }

    #[test]
    fn all_ads_flattens_in_key_order() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        let ad1 = Ad::new("about:blank#1", 0.01);
        let ad2 = Ad::new("about:blank#2", 0.02);
        let ad3 = Ad::new("about:blank#3", 0.03);
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("name 1")).with_ads(vec![ad1.clone()])));
        assert!(store.upsert_merge(&PartialInterestGroup::named(name("name 2"))));
        assert!(store.upsert_merge(
            &PartialInterestGroup::named(name("name 3")).with_ads(vec![ad2.clone(), ad3.clone()])
        ));

        assert_eq!(store.all_ads(), Some(vec![ad1, ad2, ad3]));
    }

    #[test]
    fn failed_transaction_reports_not_committed() {
        let store = InterestGroupStore::open_in_memory().expect("open store");
        store
            .db
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE interest_groups;")
            .unwrap();

        assert!(!store.upsert_merge(&PartialInterestGroup::named(name("g1"))));
        assert!(!store.remove("g1"));
        assert!(!store.for_each(|_| panic!("no rows expected")));
        assert!(store.all_ads().is_none());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.db");

        let store = InterestGroupStore::open(&path).expect("open store");
        assert!(store.upsert_merge(
            &PartialInterestGroup::named(name("g1")).with_ads(vec![Ad::new("about:blank", 0.02)])
        ));
        store.close().expect("close store");

        let store = InterestGroupStore::open(&path).expect("reopen store");
        let group = store.get("g1").expect("group persisted");
        assert_eq!(group.ads, vec![Ad::new("about:blank", 0.02)]);
    }
}
