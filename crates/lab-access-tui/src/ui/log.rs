//! Log tab: notices the user saw plus console bookkeeping, newest last.
//!
//! Notices are marked with `»` so they stand apart from console lines; the
//! title counts errors and warnings in the buffer.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;
use crate::event::{LogEntry, LogLevel, LogOrigin};

/// Render the log tab.
pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let mut title = summary(app.log_entries.iter());
    if !app.log_auto_scroll {
        title.push_str(" · scroll");
    }
    let block = Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.log_entries.is_empty() {
        let msg = Paragraph::new("  Belum ada catatan.").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, inner);
        return;
    }

    let visible = inner.height as usize;
    let total = app.log_entries.len();
    let first = if app.log_auto_scroll {
        total.saturating_sub(visible)
    } else {
        (app.scroll_offset as usize).min(total.saturating_sub(visible))
    };

    let lines: Vec<Line<'_>> = app
        .log_entries
        .iter()
        .skip(first)
        .take(visible)
        .map(entry_line)
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn entry_line(entry: &LogEntry) -> Line<'_> {
    let (tag, color) = level_tag(entry.level);
    let marker = match entry.origin {
        LogOrigin::Notice => "»",
        LogOrigin::Console => " ",
    };
    let text_style = match entry.origin {
        LogOrigin::Notice => Style::default(),
        LogOrigin::Console => Style::default().fg(Color::Gray),
    };

    Line::from(vec![
        Span::styled(
            entry.time.format(" %H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            tag,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {marker} "), Style::default().fg(Color::Cyan)),
        Span::styled(entry.message.as_str(), text_style),
    ])
}

fn level_tag(level: LogLevel) -> (&'static str, Color) {
    match level {
        LogLevel::Info => ("INFO", Color::Blue),
        LogLevel::Success => ("OK  ", Color::Green),
        LogLevel::Warn => ("WARN", Color::Yellow),
        LogLevel::Error => ("ERR ", Color::Red),
    }
}

/// `Log (n)` followed by error and warning counts when there are any.
fn summary<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> String {
    let (mut total, mut errors, mut warnings) = (0, 0, 0);
    for entry in entries {
        total += 1;
        match entry.level {
            LogLevel::Error => errors += 1,
            LogLevel::Warn => warnings += 1,
            LogLevel::Info | LogLevel::Success => {}
        }
    }

    let mut out = format!("Log ({total})");
    if errors > 0 {
        out.push_str(&format!(" · {errors} error"));
    }
    if warnings > 0 {
        out.push_str(&format!(" · {warnings} peringatan"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_access_client::notice::Notice;

    #[test]
    fn test_summary_counts_levels() {
        let entries = vec![
            LogEntry::info("Console started"),
            LogEntry::from_notice(&Notice::success("Kartu berhasil ditambahkan")).unwrap(),
            LogEntry::from_notice(&Notice::error("Terjadi kesalahan!")).unwrap(),
            LogEntry::warn("Live feed offline"),
            LogEntry::warn("Could not load Cards"),
        ];
        assert_eq!(summary(entries.iter()), "Log (5) · 1 error · 2 peringatan");
        assert_eq!(summary(entries[..2].iter()), "Log (2)");
    }

    #[test]
    fn test_notice_lines_are_marked() {
        let notice = LogEntry::from_notice(&Notice::error("UID sudah terdaftar")).unwrap();
        let line = entry_line(&notice);
        assert_eq!(line.spans[1].content, "ERR ");
        assert_eq!(line.spans[2].content, " » ");
        assert_eq!(line.spans[3].content, "UID sudah terdaftar");

        let console = LogEntry::info("Console started");
        assert_eq!(entry_line(&console).spans[2].content, "   ");
    }
}
