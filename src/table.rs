//! Plain-text tables for console output (previews, rule listings, reports).

use std::borrow::Cow;
use std::fmt::Write as _;

/// Cells wider than this are cut and suffixed with `...` in previews.
pub const PREVIEW_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>], max_width: Option<usize>) -> String {
    let column_count = headers.len();
    let clip = |value: &str| -> String {
        let sanitized = sanitize_cell(value);
        match max_width {
            Some(limit) => truncate(sanitized.as_ref(), limit),
            None => sanitized.into_owned(),
        }
    };

    let headers = headers.iter().map(|h| clip(h)).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().take(column_count).map(|cell| clip(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>], max_width: Option<usize>) {
    print!("{}", render_table(headers, rows, max_width));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(value.chars().count());
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut clipped = value.chars().take(keep).collect::<String>();
    clipped.push_str("...");
    clipped
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
