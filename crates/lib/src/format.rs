//! Renders query results as GitHub-flavored markdown tables.

use crate::types::QueryRows;
use serde_json::Value;

fn cell_text(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Formats rows as a padded markdown table with a header row.
pub fn markdown_table(result: &QueryRows) -> String {
    let header: Vec<String> = result.columns.iter().map(|c| c.replace('|', "\\|")).collect();
    let body: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            (0..header.len())
                .map(|i| row.get(i).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            body.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let render = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(render(&header));
    lines.push(format!(
        "|{}|",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("|")
    ));
    lines.extend(body.iter().map(|row| render(row)));
    lines.join("\n")
}
