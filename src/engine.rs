use crate::balancer::{base_amount, BalanceStanding, LedgerHistory};
use crate::checklist::{build_checklist, ChecklistRow};
use crate::cutoffs::CutoffRule;
use crate::error::{InvoicingError, Result};
use crate::ingestion::{validate_field_value, validate_percentage, EditEvent};
use crate::initializer::{CancellationFlag, EntryInitializer, InitializationReport};
use crate::schema::{
    Creator, EntryDraft, EntryField, FieldValue, InvoicingConfig, LedgerEntry, WeekCutoff,
};
use crate::store::LedgerStore;
use crate::utils::{due_date, format_invoice_number, shift_weeks, week_end};
use chrono::NaiveDate;
use futures::future::try_join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Amount currently owed for `entry`: its base amount less the balance carried
/// into its week. `None` while sales are unreported, whatever the balance.
pub fn invoice_amount(entry: &LedgerEntry, carried_balance: f64) -> Option<f64> {
    base_amount(entry).map(|base| base - carried_balance)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceView {
    pub creator_id: String,
    pub week_start: NaiveDate,
    pub base_amount: Option<f64>,
    pub invoice_amount: Option<f64>,
    pub carried_balance: f64,
    pub is_credit: bool,
    pub standing: BalanceStanding,
}

impl InvoiceView {
    pub fn derive(entry: &LedgerEntry, history: &LedgerHistory, tolerance: f64) -> Self {
        let carried = history.balance_into(entry.week_start_date);
        let standing = BalanceStanding::classify(carried, tolerance);
        Self {
            creator_id: entry.creator_id.clone(),
            week_start: entry.week_start_date,
            base_amount: base_amount(entry),
            invoice_amount: invoice_amount(entry, carried),
            carried_balance: carried,
            is_credit: standing.is_credit(),
            standing,
        }
    }

    pub fn has_adjustment(&self) -> bool {
        self.base_amount.is_some() && !self.standing.is_settled()
    }
}

/// The values handed to the invoice renderer. The renderer only formats
/// these; it never recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub creator: Creator,
    pub entry: LedgerEntry,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_number: String,
    pub invoice_amount: Option<f64>,
    pub base_amount: Option<f64>,
    /// Positive is credit (reduces the invoice), negative is owed.
    pub previous_balance: f64,
    pub conversion_rate: Option<f64>,
    pub converted_amount: Option<f64>,
}

impl InvoiceSnapshot {
    pub fn build(
        creator: &Creator,
        entry: &LedgerEntry,
        history: &LedgerHistory,
        conversion_rate: Option<f64>,
    ) -> Result<Self> {
        if let Some(rate) = conversion_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(InvoicingError::InvalidConversionRate(rate));
            }
        }

        let week_start = entry.week_start_date;
        let previous_balance = history.balance_into(week_start);
        let invoice = invoice_amount(entry, previous_balance);
        let due = due_date(week_start);

        Ok(Self {
            creator: creator.clone(),
            entry: entry.clone(),
            week_start,
            week_end: week_end(week_start),
            due_date: due,
            invoice_number: format_invoice_number(due, creator.default_invoice_number),
            invoice_amount: invoice,
            base_amount: base_amount(entry),
            previous_balance,
            conversion_rate,
            converted_amount: invoice.zip(conversion_rate).map(|(amount, rate)| amount * rate),
        })
    }

    pub fn adjustment_line(&self, tolerance: f64) -> Option<String> {
        self.base_amount?;
        match BalanceStanding::classify(self.previous_balance, tolerance) {
            BalanceStanding::Settled => None,
            BalanceStanding::Credit(amount) => Some(format!("-${:.2} credit", amount)),
            BalanceStanding::Debt(amount) => Some(format!("+${:.2} owed", amount)),
        }
    }
}

pub type WeekRow = (Creator, Option<LedgerEntry>, Option<InvoiceView>);

/// Orders rows by the week's invoice number, rows without one last.
pub fn sort_by_invoice_number(rows: &mut [WeekRow]) {
    rows.sort_by(|a, b| {
        let left = a.1.as_ref().and_then(|e| e.invoice_number);
        let right = b.1.as_ref().and_then(|e| e.invoice_number);
        match (left, right) {
            (Some(l), Some(r)) => l.cmp(&r),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

/// Stateless orchestration over a [`LedgerStore`].
///
/// Every derivation fetches a fresh snapshot, sorts it and folds from scratch.
/// Nothing derived is cached or persisted.
pub struct InvoicingEngine<S: LedgerStore> {
    store: Arc<S>,
    config: InvoicingConfig,
}

impl<S: LedgerStore> InvoicingEngine<S> {
    pub fn new(store: Arc<S>, config: InvoicingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &InvoicingConfig {
        &self.config
    }

    pub fn cutoff_rule(&self) -> CutoffRule {
        CutoffRule::from_config(&self.config)
    }

    pub async fn history_before(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<LedgerHistory> {
        let entries = self
            .store
            .find_entries_before(creator_id, week_start)
            .await?;
        Ok(LedgerHistory::from_unordered(entries))
    }

    pub async fn carried_balance(&self, creator_id: &str, week_start: NaiveDate) -> Result<f64> {
        Ok(self
            .history_before(creator_id, week_start)
            .await?
            .balance_into(week_start))
    }

    /// Reads an entry, treating a failed read as an absent entry.
    pub async fn find_entry(&self, creator_id: &str, week_start: NaiveDate) -> Option<LedgerEntry> {
        match self.store.find_entry(creator_id, week_start).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Entry for creator {} week {} unavailable: {}",
                    creator_id, week_start, e
                );
                None
            }
        }
    }

    pub async fn invoice_view(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<InvoiceView>> {
        let Some(entry) = self.store.find_entry(creator_id, week_start).await? else {
            return Ok(None);
        };
        let history = self.history_before(creator_id, week_start).await?;
        Ok(Some(InvoiceView::derive(
            &entry,
            &history,
            self.config.settlement_tolerance,
        )))
    }

    pub async fn week_views(
        &self,
        roster: &[Creator],
        week_start: NaiveDate,
    ) -> Result<Vec<WeekRow>> {
        let week_entries = self.store.find_entries_for_week(week_start).await?;

        let mut rows = try_join_all(roster.iter().map(|creator| {
            let entry = week_entries
                .iter()
                .find(|e| e.creator_id == creator.id)
                .cloned();
            async move {
                let view = match &entry {
                    Some(entry) => {
                        let history = self.history_before(&creator.id, week_start).await?;
                        Some(InvoiceView::derive(
                            entry,
                            &history,
                            self.config.settlement_tolerance,
                        ))
                    }
                    None => None,
                };
                Ok::<_, InvoicingError>((creator.clone(), entry, view))
            }
        }))
        .await?;

        sort_by_invoice_number(&mut rows);
        Ok(rows)
    }

    /// Returns the row for (creator, week), creating it with carried-forward
    /// percentage and invoice link when missing.
    pub async fn get_or_create_entry(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<LedgerEntry> {
        if let Some(entry) = self.store.find_entry(creator_id, week_start).await? {
            return Ok(entry);
        }

        let history = self.history_before(creator_id, week_start).await?;
        let draft = EntryDraft::carried_forward(
            creator_id,
            week_start,
            history.latest(),
            self.config.default_percentage,
        );
        debug!(
            "Creating entry for creator {} week {} at {}%",
            creator_id, week_start, draft.percentage
        );
        self.store.create_entry(draft).await
    }

    pub async fn update_field(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
        field: EntryField,
        value: FieldValue,
    ) -> Result<()> {
        validate_field_value(field, &value)?;

        if field.affects_balance() {
            debug!(
                "{} edit on creator {} week {} re-derives every later week",
                field, creator_id, week_start
            );
        }

        self.store
            .update_field(creator_id, week_start, field, value)
            .await
    }

    /// Sets the percentage on `from` and every later existing entry for the
    /// creator. Weeks that do not exist yet are not created; they inherit the
    /// new rate when they are initialized. Returns the number of rows updated.
    pub async fn propagate_percentage(
        &self,
        creator_id: &str,
        from: NaiveDate,
        percentage: f64,
    ) -> Result<usize> {
        validate_percentage(percentage)?;
        info!(
            "Setting percentage {} for creator {} from week {} onwards",
            percentage, creator_id, from
        );

        self.store
            .update_percentage_from(creator_id, from, percentage)
            .await
            .map_err(|e| InvoicingError::PropagationFailed {
                creator_id: creator_id.to_string(),
                from,
                details: e.to_string(),
            })
    }

    /// Applies a table edit and reports whether it was stored. Failures are
    /// logged; the caller keeps its previous display and retries on the next
    /// edit.
    pub async fn apply_edit(&self, event: EditEvent) -> bool {
        let result = match (event.field, &event.value) {
            (EntryField::Percentage, FieldValue::Amount(Some(p))) => self
                .propagate_percentage(&event.creator_id, event.week_start, *p)
                .await
                .map(|_| ()),
            _ => {
                self.update_field(
                    &event.creator_id,
                    event.week_start,
                    event.field,
                    event.value.clone(),
                )
                .await
            }
        };

        match result {
            Ok(()) => true,
            Err(e) if e.is_validation() => {
                warn!("Rejected {} edit for creator {}: {}", event.field, event.creator_id, e);
                false
            }
            Err(e) => {
                error!(
                    "Failed to store {} edit for creator {} week {}: {}",
                    event.field, event.creator_id, event.week_start, e
                );
                false
            }
        }
    }

    pub async fn initialize_week(
        &self,
        roster: &[Creator],
        week_start: NaiveDate,
        cancel: &CancellationFlag,
    ) -> Result<InitializationReport> {
        EntryInitializer::new(self.store.as_ref(), &self.config)
            .initialize_week(roster, week_start, cancel)
            .await
    }

    pub async fn invoice_snapshot(
        &self,
        creator: &Creator,
        week_start: NaiveDate,
        conversion_rate: Option<f64>,
    ) -> Result<InvoiceSnapshot> {
        let entry = self.get_or_create_entry(&creator.id, week_start).await?;
        let history = self.history_before(&creator.id, week_start).await?;
        InvoiceSnapshot::build(creator, &entry, &history, conversion_rate)
    }

    pub async fn checklist(
        &self,
        roster: &[Creator],
        weeks: &[WeekCutoff],
    ) -> Result<Vec<ChecklistRow>> {
        let Some(last) = weeks.iter().map(|w| w.week_start).max() else {
            return Ok(Vec::new());
        };
        let until = shift_weeks(last, 1);

        let histories = try_join_all(roster.iter().map(|creator| async move {
            let entries = self.store.find_entries_before(&creator.id, until).await?;
            Ok::<_, InvoicingError>(LedgerHistory::from_unordered(entries))
        }))
        .await?;

        Ok(build_checklist(
            roster,
            weeks,
            &histories,
            self.config.settlement_tolerance,
        ))
    }

    pub async fn recent_checklist(
        &self,
        roster: &[Creator],
        today: NaiveDate,
    ) -> Result<(Vec<WeekCutoff>, Vec<ChecklistRow>)> {
        let weeks = self
            .cutoff_rule()
            .recent_weeks(today, self.config.checklist_weeks);
        let rows = self.checklist(roster, &weeks).await?;
        Ok((weeks, rows))
    }
}
