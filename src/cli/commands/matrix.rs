//! Matrix command - list the cells a selection resolves to

use crate::cli::args::{MatrixArgs, OutputFormat};
use crate::cli::commands::Workspace;
use crate::error::DrydockResult;
use crate::matrix::{MatrixCell, MatrixResolver};
use console::style;

/// Execute the matrix command
pub async fn execute(args: MatrixArgs, ws: &Workspace) -> DrydockResult<()> {
    let request = ws.matrix_request(&args.select)?;
    let cells = MatrixResolver::new(&ws.config).resolve(&request)?;

    match args.format {
        OutputFormat::Table => print_table(&ws.config.axis_names(), &cells),
        OutputFormat::Json => print_json(&cells)?,
        OutputFormat::Plain => {
            for cell in &cells {
                println!("{}", cell);
            }
        }
    }

    Ok(())
}

fn print_table(axes: &[&str], cells: &[MatrixCell]) {
    let widths: Vec<usize> = axes
        .iter()
        .map(|axis| {
            cells
                .iter()
                .filter_map(|cell| cell.get(axis))
                .map(str::len)
                .chain(std::iter::once(axis.len()))
                .max()
                .unwrap_or(0)
                + 2
        })
        .collect();

    let header: String = axes
        .iter()
        .zip(&widths)
        .map(|(axis, width)| format!("{:<width$}", axis.to_uppercase(), width = *width))
        .collect();
    println!("{}", style(header.trim_end()).bold());
    println!("{}", "-".repeat(widths.iter().sum::<usize>().max(1)));

    for cell in cells {
        let row: String = axes
            .iter()
            .zip(&widths)
            .map(|(axis, width)| format!("{:<width$}", cell.get(axis).unwrap_or("-"), width = *width))
            .collect();
        println!("{}", row.trim_end());
    }

    println!();
    println!("{} cell(s)", cells.len());
}

fn print_json(cells: &[MatrixCell]) -> DrydockResult<()> {
    let rows: Vec<serde_json::Value> = cells
        .iter()
        .map(|cell| {
            let axes: serde_json::Map<String, serde_json::Value> = cell
                .bindings()
                .iter()
                .map(|b| (b.axis().to_string(), b.value().into()))
                .collect();
            serde_json::json!({ "key": cell.key(), "axes": axes })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
