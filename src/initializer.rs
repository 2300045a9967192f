use crate::balancer::LedgerHistory;
use crate::error::Result;
use crate::schema::{Creator, EntryDraft, InvoicingConfig, LedgerEntry};
use crate::store::LedgerStore;
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Set when the selected week changes. Workers check it before taking the next
/// creator; creations already in flight finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializationReport {
    pub week_start: NaiveDate,
    pub already_present: usize,
    pub ensured: Vec<LedgerEntry>,
    pub failed: Vec<(String, String)>,
    /// Creator ids left in the queue when the run was cancelled.
    pub skipped: Vec<String>,
    pub workers: usize,
}

impl InitializationReport {
    fn empty(week_start: NaiveDate, already_present: usize) -> Self {
        Self {
            week_start,
            already_present,
            ensured: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            workers: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Default)]
struct WorkerTally {
    ensured: Vec<LedgerEntry>,
    failed: Vec<(String, String)>,
}

pub struct EntryInitializer<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    concurrency: usize,
    default_percentage: f64,
}

impl<'a, S: LedgerStore + ?Sized> EntryInitializer<'a, S> {
    pub fn new(store: &'a S, config: &InvoicingConfig) -> Self {
        Self {
            store,
            concurrency: config.initializer_concurrency.max(1),
            default_percentage: config.default_percentage,
        }
    }

    pub async fn initialize_week(
        &self,
        roster: &[Creator],
        week_start: NaiveDate,
        cancel: &CancellationFlag,
    ) -> Result<InitializationReport> {
        let existing = self.store.find_entries_for_week(week_start).await?;
        let present: HashSet<&str> = existing.iter().map(|e| e.creator_id.as_str()).collect();

        let mut queued = HashSet::new();
        let missing: VecDeque<&Creator> = roster
            .iter()
            .filter(|c| !present.contains(c.id.as_str()))
            .filter(|c| queued.insert(c.id.clone()))
            .collect();

        let already_present = roster
            .iter()
            .filter(|c| present.contains(c.id.as_str()))
            .count();
        if missing.is_empty() {
            debug!("Week {} already has a row for every creator", week_start);
            return Ok(InitializationReport::empty(week_start, already_present));
        }

        let workers = self.concurrency.min(missing.len());
        info!(
            "Initializing {} missing entries for week {} with {} workers",
            missing.len(),
            week_start,
            workers
        );

        let queue = Mutex::new(missing);
        let tallies = join_all(
            (0..workers).map(|worker| self.drain(worker, &queue, week_start, cancel)),
        )
        .await;

        let mut report = InitializationReport::empty(week_start, already_present);
        report.workers = workers;
        for tally in tallies {
            report.ensured.extend(tally.ensured);
            report.failed.extend(tally.failed);
        }
        report.skipped = queue
            .into_inner()
            .into_iter()
            .map(|c| c.id.clone())
            .collect();

        if !report.skipped.is_empty() {
            info!(
                "Initialization of week {} cancelled with {} creators not started",
                week_start,
                report.skipped.len()
            );
        }
        Ok(report)
    }

    async fn drain(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<&Creator>>,
        week_start: NaiveDate,
        cancel: &CancellationFlag,
    ) -> WorkerTally {
        let mut tally = WorkerTally::default();

        while !cancel.is_cancelled() {
            let next = queue.lock().await.pop_front();
            let Some(creator) = next else {
                break;
            };

            debug!("Worker {} creating entry for creator {}", worker, creator.id);
            match self.create_for(creator, week_start).await {
                Ok(entry) => tally.ensured.push(entry),
                Err(e) => {
                    warn!(
                        "Could not create entry for creator {} week {}: {}",
                        creator.id, week_start, e
                    );
                    tally.failed.push((creator.id.clone(), e.to_string()));
                }
            }
        }

        tally
    }

    async fn create_for(&self, creator: &Creator, week_start: NaiveDate) -> Result<LedgerEntry> {
        let prior = self
            .store
            .find_entries_before(&creator.id, week_start)
            .await?;
        let history = LedgerHistory::from_unordered(prior);
        let draft = EntryDraft::carried_forward(
            creator.id.as_str(),
            week_start,
            history.latest(),
            self.default_percentage,
        );
        self.store.create_entry(draft).await
    }
}
