use crate::error::{InvoicingError, Result};
use crate::schema::{EntryField, FieldValue};
use crate::utils::parse_date_key;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditEvent {
    pub creator_id: String,
    pub week_start: NaiveDate,
    pub field: EntryField,
    pub value: FieldValue,
}

impl EditEvent {
    /// Parses raw cell text. Nothing here touches a store, so a rejected
    /// edit never leaves a partial mutation behind.
    pub fn parse(creator_id: &str, week_start: &str, field: &str, raw: &str) -> Result<Self> {
        let week_start = parse_date_key(week_start)?;
        let field: EntryField = field.parse()?;
        let value = parse_field_value(field, raw)?;

        Ok(Self {
            creator_id: creator_id.to_string(),
            week_start,
            field,
            value,
        })
    }
}

/// Converts cell text into a typed value for `field`.
///
/// Empty text clears nullable fields. Percentage is not nullable.
pub fn parse_field_value(field: EntryField, raw: &str) -> Result<FieldValue> {
    let raw = raw.trim();

    let value = match field {
        EntryField::Percentage | EntryField::NetSales | EntryField::Paid => {
            if raw.is_empty() {
                FieldValue::Amount(None)
            } else {
                let parsed: f64 = raw.parse().map_err(|_| {
                    InvoicingError::validation(field.as_str(), format!("'{}' is not a number", raw))
                })?;
                FieldValue::Amount(Some(parsed))
            }
        }
        EntryField::InvoiceNumber => {
            if raw.is_empty() {
                FieldValue::Number(None)
            } else {
                let parsed: i64 = raw.parse().map_err(|_| {
                    InvoicingError::validation(
                        field.as_str(),
                        format!("'{}' is not a whole number", raw),
                    )
                })?;
                FieldValue::Number(Some(parsed))
            }
        }
        EntryField::InvoicePayment => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => FieldValue::Flag(true),
            "false" | "no" | "0" | "" => FieldValue::Flag(false),
            other => {
                return Err(InvoicingError::validation(
                    field.as_str(),
                    format!("'{}' is not a yes/no value", other),
                ))
            }
        },
        EntryField::InvoiceLink | EntryField::StatementsImageKey | EntryField::ConversionImageKey => {
            if raw.is_empty() {
                FieldValue::Text(None)
            } else {
                FieldValue::Text(Some(raw.to_string()))
            }
        }
    };

    validate_field_value(field, &value)?;
    Ok(value)
}

pub fn validate_field_value(field: EntryField, value: &FieldValue) -> Result<()> {
    match (field, value) {
        (EntryField::Percentage, FieldValue::Amount(None)) => Err(InvoicingError::validation(
            field.as_str(),
            "percentage cannot be empty",
        )),
        (EntryField::Percentage, FieldValue::Amount(Some(p))) => validate_percentage(*p),
        (EntryField::NetSales | EntryField::Paid, FieldValue::Amount(amount)) => match amount {
            Some(v) if !v.is_finite() => Err(InvoicingError::validation(
                field.as_str(),
                format!("{} is not a finite amount", v),
            )),
            Some(v) if *v < 0.0 => Err(InvoicingError::NegativeAmount {
                field: field.as_str().to_string(),
                value: *v,
            }),
            _ => Ok(()),
        },
        (EntryField::InvoiceNumber, FieldValue::Number(_))
        | (EntryField::InvoicePayment, FieldValue::Flag(_))
        | (
            EntryField::InvoiceLink | EntryField::StatementsImageKey | EntryField::ConversionImageKey,
            FieldValue::Text(_),
        ) => Ok(()),
        (field, value) => Err(InvoicingError::validation(
            field.as_str(),
            format!("expected a value for {}, got {}", field, value.kind()),
        )),
    }
}

pub fn validate_percentage(percentage: f64) -> Result<()> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(InvoicingError::InvalidPercentage(percentage));
    }
    Ok(())
}
