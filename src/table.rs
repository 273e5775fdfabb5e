use std::borrow::Cow;
use std::fmt::Write as _;

const PANEL_MIN_WIDTH: usize = 40;

/// Two-column `label  value` table used for run summaries.
pub fn render_key_values(rows: &[(String, String)]) -> String {
    let label_width = rows
        .iter()
        .map(|(label, _)| display_width(label))
        .max()
        .unwrap_or(0);

    let mut output = String::new();
    for (label, value) in rows {
        let label = sanitize_cell(label);
        let padding = label_width.saturating_sub(display_width(&label));
        let line = format!("{label}{}  {}", " ".repeat(padding), sanitize_cell(value));
        let _ = writeln!(output, "{}", line.trim_end());
    }
    output
}

/// Boxed panel with a title line, used for errors and warnings.
pub fn render_panel(title: &str, body: &str) -> String {
    let body_lines: Vec<Cow<'_, str>> = body.lines().map(sanitize_cell).collect();
    // `inner` is the width between the two border columns.
    let inner = body_lines
        .iter()
        .map(|line| display_width(line) + 2)
        .chain(std::iter::once(display_width(title) + 3))
        .max()
        .unwrap_or(0)
        .max(PANEL_MIN_WIDTH);

    let mut output = String::new();
    let title_fill = inner.saturating_sub(display_width(title) + 3);
    let _ = writeln!(output, "┌─ {title} {}┐", "─".repeat(title_fill));
    for line in &body_lines {
        let padding = inner.saturating_sub(display_width(line) + 2);
        let _ = writeln!(output, "│ {line}{} │", " ".repeat(padding));
    }
    let _ = writeln!(output, "└{}┘", "─".repeat(inner));
    output
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // Skip ANSI escape sequence (e.g. \x1b[31m)
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
