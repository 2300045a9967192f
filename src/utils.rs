use crate::error::{InvoicingError, Result};
use chrono::{Datelike, Days, NaiveDate, Weekday};

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Returns the first day of the week containing `date`, for weeks that begin
/// on `week_start_day`.
pub fn week_start_for(date: NaiveDate, week_start_day: Weekday) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() + 7
        - week_start_day.num_days_from_monday())
        % 7;
    date.checked_sub_days(Days::new(offset as u64))
        .unwrap_or(NaiveDate::MIN)
}

/// Last (inclusive) day of the week starting on `week_start`.
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start
        .checked_add_days(Days::new(6))
        .unwrap_or(NaiveDate::MAX)
}

/// Invoices fall due the day after the week closes.
pub fn due_date(week_start: NaiveDate) -> NaiveDate {
    week_start
        .checked_add_days(Days::new(7))
        .unwrap_or(NaiveDate::MAX)
}

/// `None` when the shifted week falls outside the calendar chrono can represent.
pub fn checked_shift_weeks(week_start: NaiveDate, weeks: i64) -> Option<NaiveDate> {
    let days = Days::new(weeks.unsigned_abs().checked_mul(7)?);
    if weeks >= 0 {
        week_start.checked_add_days(days)
    } else {
        week_start.checked_sub_days(days)
    }
}

/// Like [`checked_shift_weeks`], clamped to the first or last representable day.
pub fn shift_weeks(week_start: NaiveDate, weeks: i64) -> NaiveDate {
    checked_shift_weeks(week_start, weeks).unwrap_or(if weeks >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}

/// Formats a week span the way the week picker shows it, e.g. "Jan 2 - Jan 8".
pub fn week_label(week_start: NaiveDate) -> String {
    format!(
        "{} - {}",
        week_start.format("%b %-d"),
        week_end(week_start).format("%b %-d")
    )
}

pub fn parse_date_key(key: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), DATE_KEY_FORMAT).map_err(|_| {
        InvoicingError::DateError(format!(
            "Invalid date key: {}. Expected YYYY-MM-DD",
            key
        ))
    })
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Builds an invoice number as `MMDD-NN` from the due date and the creator's
/// model number. Creators without a model number get "-".
pub fn format_invoice_number(due_date: NaiveDate, model_number: Option<i64>) -> String {
    match model_number {
        Some(number) => format!(
            "{:02}{:02}-{:02}",
            due_date.month(),
            due_date.day(),
            number
        ),
        None => "-".to_string(),
    }
}
