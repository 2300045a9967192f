//! # Creator Invoicing Ledger
//!
//! Weekly invoicing for creators on a commission. Each creator has one ledger
//! row per billing week recording the commission percentage, the week's net
//! sales and what was actually paid. The amount invoiced for a week is derived
//! on every read from the whole history before it; nothing derived is stored.
//!
//! ## Core Concepts
//!
//! - **Week Cutoffs**: Billing weeks start on a fixed weekday (Thursday by default)
//!   and fall due the day after they close
//! - **Base Amount**: `net_sales * percentage / 100` for a single week
//! - **Carried Balance**: What was paid minus what was truly owed, folded across
//!   every earlier week in date order. Positive is credit, negative is debt
//! - **Invoice Amount**: Base amount minus the carried balance
//! - **Forward Propagation**: A percentage change applies to its week and every
//!   later existing week, and new weeks inherit the latest percentage
//! - **Week Initialization**: Missing rows for a selected week are created by a
//!   small fixed pool of concurrent workers
//!
//! ## Example
//!
//! ```rust,ignore
//! use creator_invoicing_ledger::*;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryLedgerStore::new());
//! let engine = InvoicingEngine::new(store, InvoicingConfig::default())?;
//! let roster = vec![Creator::new("c1", "Ava").with_invoice_number(3)];
//!
//! let week = engine.cutoff_rule().cutoff_for(NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
//! engine
//!     .initialize_week(&roster, week.week_start, &CancellationFlag::new())
//!     .await?;
//!
//! let edit = EditEvent::parse("c1", &format_date_key(week.week_start), "net_sales", "1000")?;
//! assert!(engine.apply_edit(edit).await);
//!
//! let view = engine.invoice_view("c1", week.week_start).await?.unwrap();
//! assert_eq!(view.invoice_amount, Some(500.0));
//! ```

pub mod balancer;
pub mod checklist;
pub mod cutoffs;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod initializer;
pub mod schema;
pub mod store;
pub mod utils;

pub use balancer::{
    actual_invoice, balance_trail, base_amount, fold_balance, is_material, BalanceStanding,
    BalanceStep, LedgerHistory,
};
pub use checklist::{build_checklist, cell_status, ChecklistCell, ChecklistRow, ChecklistStatus};
pub use cutoffs::{CutoffRule, WeekDirection};
pub use engine::{
    invoice_amount, sort_by_invoice_number, InvoiceSnapshot, InvoiceView, InvoicingEngine, WeekRow,
};
pub use error::{InvoicingError, Result};
pub use ingestion::{parse_field_value, validate_field_value, validate_percentage, EditEvent};
pub use initializer::{CancellationFlag, EntryInitializer, InitializationReport};
pub use schema::*;
pub use store::{InMemoryLedgerStore, LedgerStore};
pub use utils::*;
