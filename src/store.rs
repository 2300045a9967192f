use crate::error::{InvoicingError, Result};
use crate::schema::{EntryDraft, EntryField, FieldValue, LedgerEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_entry(&self, creator_id: &str, week_start: NaiveDate)
        -> Result<Option<LedgerEntry>>;

    /// Every entry for the creator with `week_start_date < week_start`.
    /// Callers must not rely on the returned order.
    async fn find_entries_before(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<LedgerEntry>>;

    async fn find_entries_for_week(&self, week_start: NaiveDate) -> Result<Vec<LedgerEntry>>;

    /// Creates the row for the draft's identity. When a row with that identity
    /// already exists it is returned unchanged and nothing is written.
    async fn create_entry(&self, draft: EntryDraft) -> Result<LedgerEntry>;

    async fn update_field(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
        field: EntryField,
        value: FieldValue,
    ) -> Result<()>;

    /// Sets `percentage` on every existing entry for the creator with
    /// `week_start_date >= from`. Either every row is updated or none is.
    /// Returns the number of rows updated.
    async fn update_percentage_from(
        &self,
        creator_id: &str,
        from: NaiveDate,
        percentage: f64,
    ) -> Result<usize>;
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<(String, NaiveDate), LedgerEntry>,
    failing_weeks: BTreeSet<NaiveDate>,
    fail_reads: bool,
}

impl Inner {
    fn check_write(&self, week_start: NaiveDate) -> Result<()> {
        if self.failing_weeks.contains(&week_start) {
            return Err(InvoicingError::Store(format!(
                "write rejected for week {}",
                week_start
            )));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads {
            return Err(InvoicingError::Store("read rejected".to_string()));
        }
        Ok(())
    }
}

/// A process-local [`LedgerStore`] keyed by (creator, week).
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_writes_for(&self, week_start: NaiveDate) {
        self.inner.lock().await.failing_weeks.insert(week_start);
    }

    pub async fn fail_reads(&self, fail: bool) {
        self.inner.lock().await.fail_reads = fail;
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing_weeks.clear();
        inner.fail_reads = false;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn entries_for(&self, creator_id: &str) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .await
            .rows
            .values()
            .filter(|e| e.creator_id == creator_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_entry(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<LedgerEntry>> {
        tokio::task::yield_now().await;
        let inner = self.inner.lock().await;
        inner.check_read()?;
        Ok(inner
            .rows
            .get(&(creator_id.to_string(), week_start))
            .cloned())
    }

    async fn find_entries_before(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        tokio::task::yield_now().await;
        let inner = self.inner.lock().await;
        inner.check_read()?;
        Ok(inner
            .rows
            .values()
            .filter(|e| e.creator_id == creator_id && e.week_start_date < week_start)
            .cloned()
            .collect())
    }

    async fn find_entries_for_week(&self, week_start: NaiveDate) -> Result<Vec<LedgerEntry>> {
        tokio::task::yield_now().await;
        let inner = self.inner.lock().await;
        inner.check_read()?;
        Ok(inner
            .rows
            .values()
            .filter(|e| e.week_start_date == week_start)
            .cloned()
            .collect())
    }

    async fn create_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        inner.check_write(draft.week_start_date)?;

        let key = (draft.creator_id.clone(), draft.week_start_date);
        if let Some(existing) = inner.rows.get(&key) {
            debug!(
                "Entry for creator {} week {} already exists; returning it",
                draft.creator_id, draft.week_start_date
            );
            return Ok(existing.clone());
        }

        let entry = LedgerEntry::from_draft(draft);
        inner.rows.insert(key, entry.clone());
        Ok(entry)
    }

    async fn update_field(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
        field: EntryField,
        value: FieldValue,
    ) -> Result<()> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        inner.check_write(week_start)?;

        let entry = inner
            .rows
            .get_mut(&(creator_id.to_string(), week_start))
            .ok_or_else(|| InvoicingError::EntryNotFound {
                creator_id: creator_id.to_string(),
                week_start,
            })?;
        entry.set_field(field, &value)
    }

    async fn update_percentage_from(
        &self,
        creator_id: &str,
        from: NaiveDate,
        percentage: f64,
    ) -> Result<usize> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;

        let targets: Vec<(String, NaiveDate)> = inner
            .rows
            .keys()
            .filter(|(id, week)| id == creator_id && *week >= from)
            .cloned()
            .collect();

        // Reject the whole batch before touching any row.
        for (_, week) in &targets {
            if let Err(e) = inner.check_write(*week) {
                warn!(
                    "Percentage batch for creator {} rejected at week {}",
                    creator_id, week
                );
                return Err(e);
            }
        }

        for key in &targets {
            if let Some(entry) = inner.rows.get_mut(key) {
                entry.percentage = percentage;
            }
        }
        Ok(targets.len())
    }
}
