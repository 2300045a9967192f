use crate::schema::LedgerEntry;
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerHistory {
    entries: Vec<LedgerEntry>,
}

impl LedgerHistory {
    pub fn from_unordered(mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_key(|e| e.week_start_date);

        for pair in entries.windows(2) {
            if pair[0].identity() == pair[1].identity() {
                warn!(
                    "Duplicate ledger rows for creator {} week {}",
                    pair[0].creator_id, pair[0].week_start_date
                );
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn before(&self, week_start: NaiveDate) -> &[LedgerEntry] {
        let end = self
            .entries
            .partition_point(|e| e.week_start_date < week_start);
        &self.entries[..end]
    }

    pub fn get(&self, week_start: NaiveDate) -> Option<&LedgerEntry> {
        self.entries
            .binary_search_by_key(&week_start, |e| e.week_start_date)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn balance_into(&self, week_start: NaiveDate) -> f64 {
        fold_balance(self.before(week_start))
    }
}

/// `net_sales * percentage / 100`, or `None` while sales are unreported.
pub fn base_amount(entry: &LedgerEntry) -> Option<f64> {
    entry
        .net_sales
        .map(|sales| sales * entry.percentage / 100.0)
}

pub fn actual_invoice(base: f64, balance_in: f64) -> f64 {
    base - balance_in
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceStep {
    pub week_start: NaiveDate,
    pub balance_in: f64,
    pub actual_invoice: f64,
    pub paid: f64,
    pub balance_out: f64,
}

fn step(entry: &LedgerEntry, balance_in: f64) -> BalanceStep {
    let actual = actual_invoice(base_amount(entry).unwrap_or(0.0), balance_in);
    let paid = entry.paid.unwrap_or(0.0);
    BalanceStep {
        week_start: entry.week_start_date,
        balance_in,
        actual_invoice: actual,
        paid,
        balance_out: paid - actual,
    }
}

/// Folds `entries` (already in ascending week order) into the balance carried
/// out of the last one. Positive is credit owed to the creator, negative is
/// debt owed by them. An empty slice folds to exactly zero.
pub fn fold_balance(entries: &[LedgerEntry]) -> f64 {
    entries
        .iter()
        .fold(0.0, |balance, entry| step(entry, balance).balance_out)
}

pub fn balance_trail(entries: &[LedgerEntry]) -> Vec<BalanceStep> {
    let mut balance = 0.0;
    entries
        .iter()
        .map(|entry| {
            let s = step(entry, balance);
            balance = s.balance_out;
            s
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BalanceStanding {
    Settled,
    Credit(f64),
    Debt(f64),
}

impl BalanceStanding {
    /// Classifies a raw balance for display. Only the display rounds: the raw
    /// value keeps folding forward unchanged.
    pub fn classify(balance: f64, tolerance: f64) -> Self {
        if !is_material(balance, tolerance) {
            BalanceStanding::Settled
        } else if balance > 0.0 {
            BalanceStanding::Credit(balance)
        } else {
            BalanceStanding::Debt(-balance)
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, BalanceStanding::Credit(_))
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, BalanceStanding::Settled)
    }
}

pub fn is_material(balance: f64, tolerance: f64) -> bool {
    balance.abs() >= tolerance
}
