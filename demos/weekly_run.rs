use chrono::{Local, NaiveDate};
use creator_invoicing_ledger::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => InvoicingConfig::from_path(path)?,
        None => InvoicingConfig::default(),
    };

    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = InvoicingEngine::new(store, config)?;
    let roster = vec![
        Creator::new("ava", "Ava").with_invoice_number(1),
        Creator::new("bo", "Bo").with_invoice_number(2),
    ];

    let today: NaiveDate = Local::now().date_naive();
    let weeks = engine.cutoff_rule().recent_weeks(today, 3);

    // Three weeks of history: Ava underpays once, Bo overpays once.
    let activity = [
        ("ava", [(1000.0, 400.0), (800.0, 500.0), (900.0, 450.0)]),
        ("bo", [(1000.0, 600.0), (1000.0, 400.0), (500.0, 250.0)]),
    ];
    for week in &weeks {
        engine
            .initialize_week(&roster, week.week_start, &CancellationFlag::new())
            .await?;
    }
    for (creator_id, figures) in &activity {
        for (week, (sales, paid)) in weeks.iter().zip(figures) {
            let key = format_date_key(week.week_start);
            for (field, raw) in [("net_sales", sales.to_string()), ("paid", paid.to_string())] {
                let edit = EditEvent::parse(creator_id, &key, field, &raw)?;
                if !engine.apply_edit(edit).await {
                    eprintln!("edit rejected: {} {} {}", creator_id, key, field);
                }
            }
        }
    }

    for week in &weeks {
        println!("\n=== Week {} (due {}) ===", week.label, week.due_date);
        for (creator, _entry, view) in engine.week_views(&roster, week.week_start).await? {
            let Some(view) = view else {
                println!("{:<6} no entry", creator.display_name);
                continue;
            };
            let adjustment = match view.standing {
                BalanceStanding::Settled => "settled".to_string(),
                BalanceStanding::Credit(v) => format!("credit ${:.2}", v),
                BalanceStanding::Debt(v) => format!("owed ${:.2}", v),
            };
            println!(
                "{:<6} base {:>8} invoice {:>8} ({})",
                creator.display_name,
                view.base_amount.map(|v| format!("{:.2}", v)).unwrap_or("-".into()),
                view.invoice_amount.map(|v| format!("{:.2}", v)).unwrap_or("-".into()),
                adjustment
            );
        }
    }

    let rows = engine.checklist(&roster, &weeks).await?;
    println!("\n=== Checklist ===");
    for row in rows {
        let cells: Vec<String> = row.cells.iter().map(|c| c.status.label()).collect();
        println!("{:<6} {}", row.creator.display_name, cells.join("  "));
    }
    println!("({} weeks)", weeks.len());

    Ok(())
}
