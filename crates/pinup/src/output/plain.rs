//! Plain-text output.

use anstream::println;
use owo_colors::OwoColorize;

use crate::models::EntityReference;

const HEADER: [&str; 4] = ["No", "Type", "Name", "Ref"];

/// Lays `entities` out as a numbered table, one line per row.
fn table(entities: &[EntityReference]) -> Vec<String> {
    let rows = entities
        .iter()
        .enumerate()
        .map(|(idx, entity)| {
            [
                (idx + 1).to_string(),
                entity.kind.to_string(),
                entity.name.clone(),
                entity.reference.clone(),
            ]
        })
        .collect::<Vec<_>>();

    let mut widths = HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let layout = |cells: [&str; 4]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    std::iter::once(layout(HEADER))
        .chain(rows.iter().map(|row| layout(row.each_ref().map(String::as_str))))
        .collect()
}

pub(crate) fn render_entities(entities: &[EntityReference]) {
    if entities.is_empty() {
        println!("{}", "No references found.".green());
        return;
    }

    let mut lines = table(entities).into_iter();
    if let Some(header) = lines.next() {
        println!("{}", header.bold());
    }
    for line in lines {
        println!("{line}");
    }
}
