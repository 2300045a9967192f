use async_trait::async_trait;
use chrono::NaiveDate;
use creator_invoicing_ledger::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn week(n: i64) -> NaiveDate {
    // Week 1 starts Thursday 2025-01-02
    shift_weeks(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), n - 1)
}

fn engine_with(store: Arc<InMemoryLedgerStore>) -> InvoicingEngine<InMemoryLedgerStore> {
    InvoicingEngine::new(store, InvoicingConfig::default()).unwrap()
}

async fn record(
    engine: &InvoicingEngine<InMemoryLedgerStore>,
    creator_id: &str,
    week_start: NaiveDate,
    net_sales: Option<f64>,
    paid: Option<f64>,
) {
    engine.get_or_create_entry(creator_id, week_start).await.unwrap();
    engine
        .update_field(creator_id, week_start, EntryField::NetSales, FieldValue::Amount(net_sales))
        .await
        .unwrap();
    engine
        .update_field(creator_id, week_start, EntryField::Paid, FieldValue::Amount(paid))
        .await
        .unwrap();
}

async fn invoice_amounts(
    engine: &InvoicingEngine<InMemoryLedgerStore>,
    creator_id: &str,
    weeks: &[NaiveDate],
) -> Vec<Option<f64>> {
    let mut amounts = Vec::new();
    for w in weeks {
        let view = engine.invoice_view(creator_id, *w).await.unwrap().unwrap();
        amounts.push(view.invoice_amount);
    }
    amounts
}

#[tokio::test]
async fn test_zero_balance_without_prior_entries() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);

    assert_eq!(engine.carried_balance("nobody", week(1)).await.unwrap(), 0.0);

    record(&engine, "x", week(3), Some(1000.0), Some(0.0)).await;
    // Only entries strictly before the week count.
    assert_eq!(engine.carried_balance("x", week(3)).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_scenario_underpayment_adds_to_next_invoice() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);

    record(&engine, "x", week(1), Some(1000.0), Some(400.0)).await;
    record(&engine, "x", week(2), Some(800.0), Some(500.0)).await;

    let first = engine.invoice_view("x", week(1)).await.unwrap().unwrap();
    assert_eq!(first.base_amount, Some(500.0));
    assert_eq!(first.carried_balance, 0.0);
    assert_eq!(first.invoice_amount, Some(500.0));

    let second = engine.invoice_view("x", week(2)).await.unwrap().unwrap();
    assert_eq!(second.base_amount, Some(400.0));
    assert_eq!(second.carried_balance, -100.0);
    assert_eq!(second.invoice_amount, Some(500.0));
    assert!(!second.is_credit);
    assert_eq!(second.standing, BalanceStanding::Debt(100.0));

    assert_eq!(engine.carried_balance("x", week(3)).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_scenario_overpayment_credits_next_invoice() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);

    record(&engine, "y", week(1), Some(1000.0), Some(600.0)).await;
    record(&engine, "y", week(2), Some(1000.0), None).await;

    let second = engine.invoice_view("y", week(2)).await.unwrap().unwrap();
    assert_eq!(second.base_amount, Some(500.0));
    assert_eq!(second.carried_balance, 100.0);
    assert!(second.is_credit);
    assert_eq!(second.invoice_amount, Some(400.0));
}

#[tokio::test]
async fn test_scenario_percentage_propagates_forward_only() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());

    for n in 1..=5 {
        engine.get_or_create_entry("z", week(n)).await.unwrap();
    }

    let updated = engine.propagate_percentage("z", week(3), 60.0).await.unwrap();
    assert_eq!(updated, 3);
    assert_eq!(store.len().await, 5);

    for n in 1..=5 {
        let entry = store.find_entry("z", week(n)).await.unwrap().unwrap();
        let expected = if n < 3 { 50.0 } else { 60.0 };
        assert_eq!(entry.percentage, expected, "week {}", n);
    }

    let roster = vec![Creator::new("z", "Zed")];
    let report = engine
        .initialize_week(&roster, week(6), &CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(report.ensured.len(), 1);
    assert_eq!(report.ensured[0].percentage, 60.0);
}

#[tokio::test]
async fn test_retroactive_paid_edit_ripples_forward_only() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);
    let weeks: Vec<NaiveDate> = (1..=5).map(week).collect();

    for w in &weeks {
        record(&engine, "x", *w, Some(1000.0), Some(500.0)).await;
    }
    // A week with no sales has no invoice before or after the edit.
    engine
        .update_field("x", weeks[4], EntryField::NetSales, FieldValue::Amount(None))
        .await
        .unwrap();

    let before = invoice_amounts(&engine, "x", &weeks).await;

    let edit = EditEvent::parse("x", &format_date_key(weeks[1]), "paid", "350").unwrap();
    assert!(engine.apply_edit(edit).await);

    let after = invoice_amounts(&engine, "x", &weeks).await;

    assert_eq!(before[0], after[0]);
    assert_eq!(before[1], after[1]);
    assert_eq!(after[2], Some(650.0));
    assert_ne!(before[2], after[2]);
    assert_ne!(before[3], after[3]);
    assert_eq!(after[4], None);
}

#[tokio::test]
async fn test_percentage_edit_routes_through_propagation() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());
    for n in 1..=3 {
        engine.get_or_create_entry("x", week(n)).await.unwrap();
    }

    let edit = EditEvent::parse("x", &format_date_key(week(2)), "percentage", "40").unwrap();
    assert!(engine.apply_edit(edit).await);

    let percentages: Vec<f64> = store
        .entries_for("x")
        .await
        .iter()
        .map(|e| e.percentage)
        .collect();
    assert_eq!(percentages, vec![50.0, 40.0, 40.0]);
}

#[tokio::test]
async fn test_failed_propagation_changes_nothing() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());
    for n in 1..=4 {
        engine.get_or_create_entry("x", week(n)).await.unwrap();
    }
    store.fail_writes_for(week(4)).await;

    let err = engine.propagate_percentage("x", week(2), 70.0).await.unwrap_err();
    assert!(matches!(err, InvoicingError::PropagationFailed { .. }));
    assert!(store
        .entries_for("x")
        .await
        .iter()
        .all(|e| e.percentage == 50.0));

    let edit = EditEvent::parse("x", &format_date_key(week(2)), "percentage", "70").unwrap();
    assert!(!engine.apply_edit(edit).await);
}

#[tokio::test]
async fn test_out_of_range_percentage_is_rejected_before_store() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());
    engine.get_or_create_entry("x", week(1)).await.unwrap();

    let err = engine.propagate_percentage("x", week(1), 101.0).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        store.find_entry("x", week(1)).await.unwrap().unwrap().percentage,
        50.0
    );
}

#[tokio::test]
async fn test_concurrent_initializers_create_one_row_each() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let first = engine_with(store.clone());
    let second = engine_with(store.clone());
    let roster: Vec<Creator> = (0..8)
        .map(|i| Creator::new(format!("c{}", i), format!("Creator {}", i)))
        .collect();

    let cancel_a = CancellationFlag::new();
    let cancel_b = CancellationFlag::new();
    let (a, b) = tokio::join!(
        first.initialize_week(&roster, week(1), &cancel_a),
        second.initialize_week(&roster, week(1), &cancel_b),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_complete() && b.is_complete());

    assert_eq!(store.len().await, 8);
    for creator in &roster {
        assert_eq!(store.entries_for(&creator.id).await.len(), 1);
    }
}

#[tokio::test]
async fn test_initializer_carries_forward_latest_prior_entry() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());

    // Gap between week 1 and week 4: the latest prior entry is still used.
    engine.get_or_create_entry("x", week(1)).await.unwrap();
    engine.propagate_percentage("x", week(1), 35.0).await.unwrap();
    engine
        .update_field(
            "x",
            week(1),
            EntryField::InvoiceLink,
            FieldValue::Text(Some("https://invoices.example/x".to_string())),
        )
        .await
        .unwrap();

    let entry = engine.get_or_create_entry("x", week(4)).await.unwrap();
    assert_eq!(entry.percentage, 35.0);
    assert_eq!(entry.invoice_link.as_deref(), Some("https://invoices.example/x"));
    assert_eq!(entry.net_sales, None);
    assert_eq!(entry.paid, None);
}

/// Flips the cancellation flag as soon as the first row has been created.
struct CancelOnCreate {
    inner: InMemoryLedgerStore,
    cancel: CancellationFlag,
}

#[async_trait]
impl LedgerStore for CancelOnCreate {
    async fn find_entry(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<LedgerEntry>> {
        self.inner.find_entry(creator_id, week_start).await
    }

    async fn find_entries_before(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        self.inner.find_entries_before(creator_id, week_start).await
    }

    async fn find_entries_for_week(&self, week_start: NaiveDate) -> Result<Vec<LedgerEntry>> {
        self.inner.find_entries_for_week(week_start).await
    }

    async fn create_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
        let entry = self.inner.create_entry(draft).await?;
        self.cancel.cancel();
        Ok(entry)
    }

    async fn update_field(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
        field: EntryField,
        value: FieldValue,
    ) -> Result<()> {
        self.inner
            .update_field(creator_id, week_start, field, value)
            .await
    }

    async fn update_percentage_from(
        &self,
        creator_id: &str,
        from: NaiveDate,
        percentage: f64,
    ) -> Result<usize> {
        self.inner
            .update_percentage_from(creator_id, from, percentage)
            .await
    }
}

#[tokio::test]
async fn test_week_change_stops_draining_queue() {
    let cancel = CancellationFlag::new();
    let store = CancelOnCreate {
        inner: InMemoryLedgerStore::new(),
        cancel: cancel.clone(),
    };
    let config = InvoicingConfig {
        initializer_concurrency: 1,
        ..InvoicingConfig::default()
    };
    let roster: Vec<Creator> = (0..4)
        .map(|i| Creator::new(format!("c{}", i), format!("Creator {}", i)))
        .collect();

    let report = EntryInitializer::new(&store, &config)
        .initialize_week(&roster, week(1), &cancel)
        .await
        .unwrap();

    assert_eq!(report.ensured.len(), 1);
    assert_eq!(report.skipped, vec!["c1", "c2", "c3"]);
    assert_eq!(store.inner.len().await, 1);

    // The next view of the week fills in the rest.
    let report = EntryInitializer::new(&store.inner, &config)
        .initialize_week(&roster, week(1), &CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(report.already_present, 1);
    assert_eq!(report.ensured.len(), 3);
    assert_eq!(store.inner.len().await, 4);
}

/// Records the most creations that were ever in flight together.
#[derive(Default)]
struct InFlightCounter {
    inner: InMemoryLedgerStore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl LedgerStore for InFlightCounter {
    async fn find_entry(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<LedgerEntry>> {
        self.inner.find_entry(creator_id, week_start).await
    }

    async fn find_entries_before(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        self.inner.find_entries_before(creator_id, week_start).await
    }

    async fn find_entries_for_week(&self, week_start: NaiveDate) -> Result<Vec<LedgerEntry>> {
        self.inner.find_entries_for_week(week_start).await
    }

    async fn create_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let result = self.inner.create_entry(draft).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn update_field(
        &self,
        creator_id: &str,
        week_start: NaiveDate,
        field: EntryField,
        value: FieldValue,
    ) -> Result<()> {
        self.inner
            .update_field(creator_id, week_start, field, value)
            .await
    }

    async fn update_percentage_from(
        &self,
        creator_id: &str,
        from: NaiveDate,
        percentage: f64,
    ) -> Result<usize> {
        self.inner
            .update_percentage_from(creator_id, from, percentage)
            .await
    }
}

async fn max_creations_in_flight(roster_size: usize) -> (usize, InitializationReport) {
    let store = InFlightCounter::default();
    let config = InvoicingConfig::default();
    let roster: Vec<Creator> = (0..roster_size)
        .map(|i| Creator::new(format!("c{}", i), format!("Creator {}", i)))
        .collect();

    let report = EntryInitializer::new(&store, &config)
        .initialize_week(&roster, week(1), &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(store.inner.len().await, roster_size);
    (store.max_in_flight.load(Ordering::SeqCst), report)
}

#[tokio::test]
async fn test_creations_in_flight_never_exceed_five() {
    let (max, report) = max_creations_in_flight(30).await;
    assert_eq!(max, 5);
    assert_eq!(report.ensured.len(), 30);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_short_queue_limits_creations_in_flight() {
    let (max, report) = max_creations_in_flight(2).await;
    assert_eq!(max, 2);
    assert_eq!(report.ensured.len(), 2);
}

#[tokio::test]
async fn test_failed_read_is_treated_as_absent() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store.clone());
    engine.get_or_create_entry("x", week(1)).await.unwrap();

    store.fail_reads(true).await;
    assert!(engine.find_entry("x", week(1)).await.is_none());
    assert!(engine.invoice_view("x", week(1)).await.is_err());

    store.fail_reads(false).await;
    assert!(engine.find_entry("x", week(1)).await.is_some());
}

#[tokio::test]
async fn test_week_views_sorted_by_invoice_number() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);
    let roster = vec![
        Creator::new("a", "Ava"),
        Creator::new("b", "Bo"),
        Creator::new("c", "Cy"),
    ];
    engine
        .initialize_week(&roster, week(1), &CancellationFlag::new())
        .await
        .unwrap();
    engine
        .update_field("b", week(1), EntryField::InvoiceNumber, FieldValue::Number(Some(1)))
        .await
        .unwrap();
    engine
        .update_field("c", week(1), EntryField::InvoiceNumber, FieldValue::Number(Some(2)))
        .await
        .unwrap();

    let rows = engine.week_views(&roster, week(1)).await.unwrap();
    let order: Vec<&str> = rows.iter().map(|r| r.0.id.as_str()).collect();
    assert_eq!(order, vec!["b", "c", "a"]);
    assert!(rows.iter().all(|r| r.2.is_some()));
}

#[tokio::test]
async fn test_snapshot_for_renderer() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);
    let creator = Creator::new("x", "Xan").with_invoice_number(9);

    record(&engine, "x", week(1), Some(1000.0), Some(600.0)).await;
    record(&engine, "x", week(2), Some(1000.0), None).await;

    let snapshot = engine
        .invoice_snapshot(&creator, week(2), Some(1.5))
        .await
        .unwrap();
    assert_eq!(snapshot.week_start, week(2));
    assert_eq!(snapshot.due_date, week(3));
    assert_eq!(snapshot.invoice_number, "0116-09");
    assert_eq!(snapshot.base_amount, Some(500.0));
    assert_eq!(snapshot.previous_balance, 100.0);
    assert_eq!(snapshot.invoice_amount, Some(400.0));
    assert_eq!(snapshot.converted_amount, Some(600.0));
    assert_eq!(snapshot.adjustment_line(0.01).as_deref(), Some("-$100.00 credit"));
}

#[tokio::test]
async fn test_checklist_uses_full_history() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = engine_with(store);
    let roster = vec![Creator::new("x", "Xan"), Creator::new("y", "Yu")];

    // Debt in week 1, then nothing recorded for x until week 4.
    record(&engine, "x", week(1), Some(1000.0), Some(400.0)).await;
    record(&engine, "y", week(1), Some(1000.0), Some(500.0)).await;
    engine
        .update_field("y", week(1), EntryField::InvoicePayment, FieldValue::Flag(true))
        .await
        .unwrap();

    let (weeks, rows) = engine
        .recent_checklist(&roster, week(4) + chrono::Days::new(2))
        .await
        .unwrap();
    assert_eq!(weeks.len(), 12);
    assert_eq!(weeks.last().unwrap().week_start, week(4));

    let x_cells: Vec<ChecklistStatus> = rows[0].cells.iter().map(|c| c.status).collect();
    let y_cells: Vec<ChecklistStatus> = rows[1].cells.iter().map(|c| c.status).collect();

    // Last four columns are weeks 1 to 4.
    assert_eq!(&x_cells[8..], &[
        ChecklistStatus::Pending,
        ChecklistStatus::Debt(100.0),
        ChecklistStatus::Debt(100.0),
        ChecklistStatus::Debt(100.0),
    ]);
    assert_eq!(y_cells[8], ChecklistStatus::Paid);
    assert_eq!(y_cells[9], ChecklistStatus::Pending);
}
