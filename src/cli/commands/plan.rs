//! Plan command - show rebuild/reuse decisions without building

use crate::build::{BuildAction, BuildDecision};
use crate::cli::args::{OutputFormat, PlanArgs};
use crate::cli::commands::Workspace;
use crate::error::{DrydockError, DrydockResult};
use crate::matrix::MatrixCell;
use console::style;

type Planned = Vec<(MatrixCell, DrydockResult<BuildDecision>)>;

/// Execute the plan command
pub async fn execute(args: PlanArgs, ws: &Workspace) -> DrydockResult<()> {
    let pipeline = ws.pipeline().await?;
    let request = ws.matrix_request(&args.select)?;
    let cells = pipeline.resolve(&request)?;
    let planned = pipeline.plan(&cells, args.force).await?;

    match args.format {
        OutputFormat::Table => print_table(&planned),
        OutputFormat::Json => print_json(&planned)?,
        OutputFormat::Plain => {
            for (cell, decision) in &planned {
                match decision {
                    Ok(d) => println!("{}\t{}\t{}", cell, d.action, d.reason),
                    Err(_) => println!("{}\terror", cell),
                }
            }
        }
    }

    let errors = planned.iter().filter(|(_, d)| d.is_err()).count();
    if errors > 0 {
        return Err(DrydockError::User(format!(
            "{} cell(s) could not be planned",
            errors
        )));
    }
    Ok(())
}

fn print_table(planned: &Planned) {
    let width = planned
        .iter()
        .map(|(cell, _)| cell.key().len())
        .max()
        .unwrap_or(4)
        .max(4)
        + 2;

    println!(
        "{:<width$}{:<16}{:<18}{}",
        style("CELL").bold(),
        style("ACTION").bold(),
        style("REASON").bold(),
        style("FINGERPRINT").bold(),
        width = width
    );
    println!("{}", "-".repeat(width + 16 + 18 + 16));

    for (cell, decision) in planned {
        match decision {
            Ok(d) => {
                let action = format!("{:<16}", d.action.to_string());
                let action = match d.action {
                    BuildAction::Reuse => style(action).green(),
                    _ => style(action).yellow(),
                };
                println!(
                    "{:<width$}{}{:<18}{}",
                    cell.key(),
                    action,
                    d.reason.to_string(),
                    d.fingerprint.short(),
                    width = width
                );
            }
            Err(e) => println!(
                "{:<width$}{} {}",
                cell.key(),
                style("error").red(),
                e,
                width = width
            ),
        }
    }

    let rebuilds = planned
        .iter()
        .filter(|(_, d)| matches!(d, Ok(d) if d.action != BuildAction::Reuse))
        .count();
    println!();
    println!("{} cell(s), {} to build", planned.len(), rebuilds);
}

fn print_json(planned: &Planned) -> DrydockResult<()> {
    let rows: Vec<serde_json::Value> = planned
        .iter()
        .map(|(cell, decision)| match decision {
            Ok(d) => serde_json::json!({
                "cell": cell,
                "action": d.action,
                "reason": d.reason,
                "fingerprint": d.fingerprint.to_string(),
                "image": d.recipe.tag,
                "recipe": d.recipe.describe(),
            }),
            Err(e) => serde_json::json!({
                "cell": cell,
                "error": e.to_string(),
                "layer": e.layer().to_string(),
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
