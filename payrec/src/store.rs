//! Authoritative payment ledger store.
//!
//! One process-wide table of payment records, keyed by the provider's
//! external track id with a secondary index on the internal payment id.
//! Each record lives behind its own async mutex, so a webhook, a poll
//! and the sweeper can race on the same payment while unrelated records
//! never contend on a global lock.
//!
//! Durability is an optional append-only JSON-lines journal: every
//! committed mutation appends the record's full state, and [`LedgerStore::open`]
//! replays the journal last-write-wins. Records are never deleted.
//!
//! Journal appends are synchronous writes performed while the caller
//! holds the record's lock, so the terminal status is on disk before
//! the effect runs. Each append is one flushed line; on a pathologically
//! slow disk this stalls the worker thread, which is accepted over
//! handing the write to another task and losing the
//! status-before-effect ordering.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;

use crate::error::PayError;
use crate::record::{PaymentId, PaymentRecord};

/// Process-wide payment ledger with per-record locking.
#[derive(Debug)]
pub struct LedgerStore {
    records: DashMap<String, Arc<Mutex<PaymentRecord>>>,
    by_id: DashMap<PaymentId, String>,
    journal: Option<std::sync::Mutex<File>>,
}

impl LedgerStore {
    /// Opens a store backed by a journal file, replaying any existing
    /// entries.
    ///
    /// # Errors
    ///
    /// Fails if the journal cannot be read, appended to, or decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PayError> {
        let path = path.as_ref();
        let store = Self::in_memory();

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: PaymentRecord = serde_json::from_str(&line)?;
                store
                    .by_id
                    .insert(record.id.clone(), record.external_track_id.clone());
                // Later journal lines supersede earlier state. Nothing
                // else can hold these records yet, so replacing the slot
                // wholesale is safe.
                store.records.insert(
                    record.external_track_id.clone(),
                    Arc::new(Mutex::new(record)),
                );
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            journal: Some(std::sync::Mutex::new(file)),
            ..store
        })
    }

    /// Opens a purely in-memory store with no durability.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: DashMap::new(),
            by_id: DashMap::new(),
            journal: None,
        }
    }

    /// Inserts a freshly created record.
    ///
    /// # Errors
    ///
    /// [`PayError::DuplicateTrackId`] if a record with the same external
    /// track id already exists.
    pub fn insert(&self, record: PaymentRecord) -> Result<(), PayError> {
        match self.records.entry(record.external_track_id.clone()) {
            Entry::Occupied(_) => Err(PayError::DuplicateTrackId(record.external_track_id)),
            Entry::Vacant(slot) => {
                self.append(&record)?;
                self.by_id
                    .insert(record.id.clone(), record.external_track_id.clone());
                slot.insert(Arc::new(Mutex::new(record)));
                Ok(())
            }
        }
    }

    /// Returns the per-record lock handle for a read-modify-write cycle.
    #[must_use]
    pub fn entry(&self, external_track_id: &str) -> Option<Arc<Mutex<PaymentRecord>>> {
        self.records
            .get(external_track_id)
            .map(|slot| Arc::clone(slot.value()))
    }

    /// Snapshot of a record by its public payment id.
    pub async fn get(&self, id: &PaymentId) -> Option<PaymentRecord> {
        let track = self.by_id.get(id)?.value().clone();
        self.get_by_track(&track).await
    }

    /// Snapshot of a record by external track id.
    pub async fn get_by_track(&self, external_track_id: &str) -> Option<PaymentRecord> {
        let slot = self.entry(external_track_id)?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    /// Persists the state of a record the caller has mutated under its
    /// lock.
    ///
    /// # Errors
    ///
    /// Fails if the journal append fails; the in-memory state is already
    /// updated at that point and the next commit re-writes it.
    pub fn commit(&self, record: &PaymentRecord) -> Result<(), PayError> {
        self.append(record)
    }

    /// All known external track ids, for sweeper scans.
    #[must_use]
    pub fn track_ids(&self) -> Vec<String> {
        self.records.iter().map(|slot| slot.key().clone()).collect()
    }

    /// Number of records in the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn append(&self, record: &PaymentRecord) -> Result<(), PayError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let line = serde_json::to_string(record)?;
        // A poisoned lock only means another append panicked mid-write;
        // the file handle itself is still usable.
        let mut file = journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{OwnerRef, PaymentStatus, Purpose};
    use crate::timestamp::UnixTimestamp;

    fn record(track: &str) -> PaymentRecord {
        PaymentRecord {
            id: PaymentId::generate(),
            external_track_id: track.to_owned(),
            purpose: Purpose::from("deposit"),
            owner_ref: OwnerRef::from("user-1"),
            requested_fiat_amount: "10".parse().unwrap(),
            fiat_currency: "USD".to_owned(),
            settlement_currency: "ETH".to_owned(),
            settlement_amount: "0.004".parse().unwrap(),
            status: PaymentStatus::Pending,
            created_at: UnixTimestamp::from_secs(1000),
            expires_at: UnixTimestamp::from_secs(2800),
            settled_at: None,
            effect_applied: false,
            last_notification_source: None,
        }
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let store = LedgerStore::in_memory();
        let rec = record("trk-1");
        let id = rec.id.clone();
        store.insert(rec).unwrap();

        let by_track = store.get_by_track("trk-1").await.unwrap();
        assert_eq!(by_track.id, id);
        let by_id = store.get(&id).await.unwrap();
        assert_eq!(by_id.external_track_id, "trk-1");
        assert!(store.get_by_track("trk-9").await.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rejects_duplicate_track_id() {
        let store = LedgerStore::in_memory();
        store.insert(record("trk-1")).unwrap();
        let err = store.insert(record("trk-1")).unwrap_err();
        assert!(matches!(err, PayError::DuplicateTrackId(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn journal_replays_last_write() {
        let path = std::env::temp_dir().join(format!("payrec-journal-{}.jsonl", PaymentId::generate()));

        {
            let store = LedgerStore::open(&path).unwrap();
            let rec = record("trk-1");
            store.insert(rec).unwrap();

            let slot = store.entry("trk-1").unwrap();
            let mut rec = slot.lock().await;
            rec.status = PaymentStatus::Paid;
            rec.effect_applied = true;
            store.commit(&rec).unwrap();
        }

        let reopened = LedgerStore::open(&path).unwrap();
        let rec = reopened.get_by_track("trk-1").await.unwrap();
        assert_eq!(rec.status, PaymentStatus::Paid);
        assert!(rec.effect_applied);
        assert_eq!(reopened.len(), 1);
    }
}
