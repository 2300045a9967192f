use crate::error::{InvoicingError, Result};
use chrono::{NaiveDate, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_PERCENTAGE: f64 = 50.0;
pub const DEFAULT_INITIALIZER_CONCURRENCY: usize = 5;
pub const DEFAULT_SETTLEMENT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_CHECKLIST_WEEKS: usize = 12;
pub const MAX_CHECKLIST_WEEKS: usize = 520;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Creator {
    #[schemars(description = "Stable opaque identifier of the creator")]
    pub id: String,

    #[schemars(description = "Name shown in tables and on the invoice")]
    pub display_name: String,

    #[serde(default)]
    #[schemars(
        description = "Two-digit model number used as the suffix of generated invoice numbers"
    )]
    pub default_invoice_number: Option<i64>,
}

impl Creator {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            default_invoice_number: None,
        }
    }

    pub fn with_invoice_number(mut self, number: i64) -> Self {
        self.default_invoice_number = Some(number);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    pub creator_id: String,

    #[schemars(description = "First day of the week this row covers (YYYY-MM-DD)")]
    pub week_start_date: NaiveDate,

    #[schemars(description = "Commission rate in percent, between 0 and 100")]
    pub percentage: f64,

    #[serde(default)]
    #[schemars(description = "Gross sales for the week. Null until reported.")]
    pub net_sales: Option<f64>,

    #[serde(default)]
    #[schemars(
        description = "Amount actually remitted for the week. Null counts as zero in balance math."
    )]
    pub paid: Option<f64>,

    #[serde(default)]
    pub invoice_payment: bool,

    #[serde(default)]
    pub invoice_number: Option<i64>,

    #[serde(default)]
    pub invoice_link: Option<String>,

    #[serde(default)]
    pub statements_image_key: Option<String>,

    #[serde(default)]
    pub conversion_image_key: Option<String>,
}

impl LedgerEntry {
    pub fn identity(&self) -> (&str, NaiveDate) {
        (&self.creator_id, self.week_start_date)
    }

    pub fn from_draft(draft: EntryDraft) -> Self {
        Self {
            creator_id: draft.creator_id,
            week_start_date: draft.week_start_date,
            percentage: draft.percentage,
            net_sales: None,
            paid: None,
            invoice_payment: false,
            invoice_number: None,
            invoice_link: draft.invoice_link,
            statements_image_key: None,
            conversion_image_key: None,
        }
    }

    pub fn set_field(&mut self, field: EntryField, value: &FieldValue) -> Result<()> {
        match (field, value) {
            (EntryField::Percentage, FieldValue::Amount(Some(v))) => self.percentage = *v,
            (EntryField::NetSales, FieldValue::Amount(v)) => self.net_sales = *v,
            (EntryField::Paid, FieldValue::Amount(v)) => self.paid = *v,
            (EntryField::InvoicePayment, FieldValue::Flag(v)) => self.invoice_payment = *v,
            (EntryField::InvoiceNumber, FieldValue::Number(v)) => self.invoice_number = *v,
            (EntryField::InvoiceLink, FieldValue::Text(v)) => self.invoice_link = v.clone(),
            (EntryField::StatementsImageKey, FieldValue::Text(v)) => {
                self.statements_image_key = v.clone()
            }
            (EntryField::ConversionImageKey, FieldValue::Text(v)) => {
                self.conversion_image_key = v.clone()
            }
            (field, value) => {
                return Err(InvoicingError::validation(
                    field.as_str(),
                    format!("{} cannot hold {}", field, value.kind()),
                ))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub creator_id: String,
    pub week_start_date: NaiveDate,
    pub percentage: f64,
    pub invoice_link: Option<String>,
}

impl EntryDraft {
    /// Carries percentage and invoice link forward from the most recent prior
    /// entry, falling back to `default_percentage` when there is none.
    pub fn carried_forward(
        creator_id: impl Into<String>,
        week_start_date: NaiveDate,
        latest_prior: Option<&LedgerEntry>,
        default_percentage: f64,
    ) -> Self {
        Self {
            creator_id: creator_id.into(),
            week_start_date,
            percentage: latest_prior
                .map(|e| e.percentage)
                .unwrap_or(default_percentage),
            invoice_link: latest_prior.and_then(|e| e.invoice_link.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryField {
    Percentage,
    NetSales,
    Paid,
    InvoicePayment,
    InvoiceNumber,
    InvoiceLink,
    StatementsImageKey,
    ConversionImageKey,
}

impl EntryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryField::Percentage => "percentage",
            EntryField::NetSales => "net_sales",
            EntryField::Paid => "paid",
            EntryField::InvoicePayment => "invoice_payment",
            EntryField::InvoiceNumber => "invoice_number",
            EntryField::InvoiceLink => "invoice_link",
            EntryField::StatementsImageKey => "statements_image_key",
            EntryField::ConversionImageKey => "conversion_image_key",
        }
    }

    /// Fields that feed the balance fold. Editing one of these changes every
    /// later week's derived invoice amount.
    pub fn affects_balance(&self) -> bool {
        matches!(
            self,
            EntryField::Percentage | EntryField::NetSales | EntryField::Paid
        )
    }
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryField {
    type Err = InvoicingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "percentage" => Ok(EntryField::Percentage),
            "net_sales" => Ok(EntryField::NetSales),
            "paid" => Ok(EntryField::Paid),
            "invoice_payment" => Ok(EntryField::InvoicePayment),
            "invoice_number" => Ok(EntryField::InvoiceNumber),
            "invoice_link" => Ok(EntryField::InvoiceLink),
            "statements_image_key" => Ok(EntryField::StatementsImageKey),
            "conversion_image_key" => Ok(EntryField::ConversionImageKey),
            other => Err(InvoicingError::validation(
                "field",
                format!("unknown ledger field '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Amount(Option<f64>),
    Flag(bool),
    Number(Option<i64>),
    Text(Option<String>),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Amount(_) => "an amount",
            FieldValue::Flag(_) => "a flag",
            FieldValue::Number(_) => "a whole number",
            FieldValue::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct WeekCutoff {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub due_date: NaiveDate,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InvoicingConfig {
    #[serde(default = "default_week_start_day")]
    #[schemars(
        description = "Day the billing week starts on. Thursday gives a Thursday-Wednesday cutoff."
    )]
    pub week_start_day: Weekday,

    #[serde(default = "default_percentage")]
    #[schemars(description = "Commission percentage for a creator with no prior entries")]
    pub default_percentage: f64,

    #[serde(default = "default_initializer_concurrency")]
    #[schemars(description = "Maximum number of entry creations in flight at once")]
    pub initializer_concurrency: usize,

    #[serde(default = "default_settlement_tolerance")]
    #[schemars(
        description = "Balances with an absolute value below this are shown as settled"
    )]
    pub settlement_tolerance: f64,

    #[serde(default = "default_checklist_weeks")]
    #[schemars(description = "Weeks shown in the payment checklist, at most 520")]
    pub checklist_weeks: usize,

    #[serde(default = "default_department_overrides")]
    #[schemars(description = "Departments that bill on a different week start day")]
    pub department_overrides: BTreeMap<String, Weekday>,
}

fn default_week_start_day() -> Weekday {
    Weekday::Thu
}

fn default_percentage() -> f64 {
    DEFAULT_PERCENTAGE
}

fn default_initializer_concurrency() -> usize {
    DEFAULT_INITIALIZER_CONCURRENCY
}

fn default_settlement_tolerance() -> f64 {
    DEFAULT_SETTLEMENT_TOLERANCE
}

fn default_checklist_weeks() -> usize {
    DEFAULT_CHECKLIST_WEEKS
}

// The night department runs Wednesday-Tuesday.
fn default_department_overrides() -> BTreeMap<String, Weekday> {
    let mut overrides = BTreeMap::new();
    overrides.insert("10PM".to_string(), Weekday::Wed);
    overrides
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            week_start_day: default_week_start_day(),
            default_percentage: DEFAULT_PERCENTAGE,
            initializer_concurrency: DEFAULT_INITIALIZER_CONCURRENCY,
            settlement_tolerance: DEFAULT_SETTLEMENT_TOLERANCE,
            checklist_weeks: DEFAULT_CHECKLIST_WEEKS,
            department_overrides: default_department_overrides(),
        }
    }
}

impl InvoicingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.default_percentage) {
            return Err(InvoicingError::InvalidPercentage(self.default_percentage));
        }
        if self.initializer_concurrency == 0 {
            return Err(InvoicingError::InvalidConfig(
                "initializer_concurrency must be at least 1".to_string(),
            ));
        }
        if !self.settlement_tolerance.is_finite() || self.settlement_tolerance < 0.0 {
            return Err(InvoicingError::InvalidConfig(format!(
                "settlement_tolerance {} must be a non-negative number",
                self.settlement_tolerance
            )));
        }
        if self.checklist_weeks > MAX_CHECKLIST_WEEKS {
            return Err(InvoicingError::InvalidConfig(format!(
                "checklist_weeks {} exceeds the maximum of {}",
                self.checklist_weeks, MAX_CHECKLIST_WEEKS
            )));
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(InvoicingConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
