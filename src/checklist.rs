use crate::balancer::{BalanceStanding, LedgerHistory};
use crate::schema::{Creator, WeekCutoff};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChecklistStatus {
    Credit(f64),
    Debt(f64),
    Paid,
    Pending,
}

impl ChecklistStatus {
    pub fn label(&self) -> String {
        match self {
            ChecklistStatus::Credit(amount) | ChecklistStatus::Debt(amount) => {
                format!("${:.0}", amount)
            }
            ChecklistStatus::Paid => "paid".to_string(),
            ChecklistStatus::Pending => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistCell {
    pub week_start: NaiveDate,
    pub due_date: NaiveDate,
    pub status: ChecklistStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistRow {
    pub creator: Creator,
    pub cells: Vec<ChecklistCell>,
}

pub fn cell_status(
    history: &LedgerHistory,
    week_start: NaiveDate,
    tolerance: f64,
) -> ChecklistStatus {
    match BalanceStanding::classify(history.balance_into(week_start), tolerance) {
        BalanceStanding::Credit(amount) => ChecklistStatus::Credit(amount),
        BalanceStanding::Debt(amount) => ChecklistStatus::Debt(amount),
        BalanceStanding::Settled => match history.get(week_start) {
            Some(entry) if entry.invoice_payment => ChecklistStatus::Paid,
            _ => ChecklistStatus::Pending,
        },
    }
}

/// `histories[i]` belongs to `roster[i]` and must reach at least through the
/// last week in `weeks`.
pub fn build_checklist(
    roster: &[Creator],
    weeks: &[WeekCutoff],
    histories: &[LedgerHistory],
    tolerance: f64,
) -> Vec<ChecklistRow> {
    roster
        .iter()
        .zip(histories)
        .map(|(creator, history)| ChecklistRow {
            creator: creator.clone(),
            cells: weeks
                .iter()
                .map(|week| ChecklistCell {
                    week_start: week.week_start,
                    due_date: week.due_date,
                    status: cell_status(history, week.week_start, tolerance),
                })
                .collect(),
        })
        .collect()
}
