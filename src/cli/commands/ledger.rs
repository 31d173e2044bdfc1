//! Ledger command - inspect and reset recorded builds

use crate::cache::{BuildStatus, LedgerEntry};
use crate::cli::args::{LedgerAction, LedgerArgs, OutputFormat};
use crate::cli::commands::Workspace;
use crate::error::DrydockResult;
use crate::matrix::MatrixCell;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the ledger command
pub async fn execute(args: LedgerArgs, ws: &Workspace) -> DrydockResult<()> {
    let ledger = ws.open_ledger().await?;
    let ctx = UiContext::detect();

    match args.action {
        LedgerAction::List { format } => {
            let entries = ledger.entries().await?;
            if entries.is_empty() {
                match format {
                    OutputFormat::Json => println!("[]"),
                    OutputFormat::Plain => {}
                    OutputFormat::Table => ui::step_info(&ctx, "No builds recorded"),
                }
                return Ok(());
            }
            match format {
                OutputFormat::Table => print_table(&entries),
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Plain => {
                    for entry in &entries {
                        println!("{}\t{}", entry.cell, status_label(entry));
                    }
                }
            }
        }
        LedgerAction::Forget { cell } => {
            let cell = MatrixCell::parse_key(&cell)?;
            if ledger.forget(&cell).await? {
                ui::step_ok(&ctx, &format!("Forgot {}", cell));
            } else {
                ui::step_warn_hint(
                    &ctx,
                    &format!("No record for {}", cell),
                    "Run: drydock ledger list",
                );
            }
        }
        LedgerAction::Clear => {
            let removed = ledger.clear().await?;
            ui::step_ok_detail(
                &ctx,
                "Ledger cleared",
                &format!("{} record(s) removed", removed),
            );
        }
    }

    Ok(())
}

fn status_label(entry: &LedgerEntry) -> String {
    if entry.interrupted {
        format!("{} (interrupted)", entry.status)
    } else {
        entry.status.to_string()
    }
}

fn print_table(entries: &[LedgerEntry]) {
    let width = entries
        .iter()
        .map(|e| e.cell.key().len())
        .max()
        .unwrap_or(4)
        .max(4)
        + 2;

    println!(
        "{:<width$}{:<24}{:<18}{}",
        style("CELL").bold(),
        style("STATUS").bold(),
        style("BUILT").bold(),
        style("FINGERPRINT").bold(),
        width = width
    );
    println!("{}", "-".repeat(width + 24 + 18 + 16));

    for entry in entries {
        let label = format!("{:<24}", status_label(entry));
        let label = match entry.status {
            BuildStatus::Success => style(label).green(),
            BuildStatus::InProgress => style(label).yellow(),
            BuildStatus::Failed => style(label).red(),
        };
        let fingerprint = entry
            .fingerprint
            .as_ref()
            .map(|f| f.short().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<width$}{}{:<18}{}",
            entry.cell.key(),
            label,
            entry.built_at.format("%Y-%m-%d %H:%M").to_string(),
            fingerprint,
            width = width
        );
    }

    println!();
    println!("{} record(s)", entries.len());
}

fn print_json(entries: &[LedgerEntry]) -> DrydockResult<()> {
    let rows: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "cell": e.cell,
                "status": e.status,
                "interrupted": e.interrupted,
                "built_at": e.built_at,
                "fingerprint": e.fingerprint.as_ref().map(|f| f.to_string()),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
