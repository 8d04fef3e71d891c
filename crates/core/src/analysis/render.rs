use crate::dataset::Table;

pub const MAX_RENDERED_ROWS: usize = 20;

/// A 1x1 result prints as the bare value; anything else as an aligned table.
pub fn render_table(table: &Table) -> String {
    if table.width() == 1 && table.len() == 1 {
        return format_number(table.rows()[0][0]);
    }

    let shown = table.len().min(MAX_RENDERED_ROWS);
    let mut cells: Vec<Vec<String>> = Vec::with_capacity(shown + 1);
    cells.push(table.columns().to_vec());
    for row in &table.rows()[..shown] {
        cells.push(row.iter().map(|value| format_number(*value)).collect());
    }

    let widths: Vec<usize> = (0..table.width())
        .map(|column| cells.iter().map(|row| row[column].len()).max().unwrap_or(0))
        .collect();

    let mut lines: Vec<String> = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:>width$}"))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect();

    if table.is_empty() {
        lines.push("(0 rows)".to_string());
    } else if table.len() > shown {
        lines.push(format!("... ({} more rows)", table.len() - shown));
    }
    lines.join("\n")
}

/// Whole numbers print without a fraction; others with at most four decimals.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }

    let fixed = format!("{value:.4}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
